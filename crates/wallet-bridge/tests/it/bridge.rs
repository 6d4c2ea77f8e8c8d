use crate::utils::{ACCOUNT, MockQueueServer, StaticDiscovery, StubWallet, TX_HASH, wait_until};
use alloy_primitives::Bytes;
use foundry_wallet_bridge::{
    BridgeError, PendingRequest, ProviderRegistry, WalletBridge,
    types::{Connection, ConnectionStatus},
};
use serde_json::{Value, json};
use std::sync::Arc;

async fn setup(wallet: Arc<StubWallet>) -> eyre::Result<(MockQueueServer, WalletBridge)> {
    crate::init_tracing();
    let server = MockQueueServer::spawn(Some("token")).await?;
    let discovery = Arc::new(StaticDiscovery::new(vec![("Stub", wallet)]));
    let registry = ProviderRegistry::new(discovery, None);
    let mut bridge = WalletBridge::new(server.config(), registry)?;
    bridge.refresh_providers().await?;
    Ok((server, bridge))
}

fn queue_connection(server: &MockQueueServer) -> eyre::Result<ConnectionStatus> {
    Ok(serde_json::from_value(server.data().connection.clone())?)
}

#[tokio::test]
async fn confirmed_session_is_published() -> eyre::Result<()> {
    let wallet = Arc::new(StubWallet::new(1));
    let (server, bridge) = setup(wallet).await?;

    assert_eq!(bridge.providers().len(), 1);
    assert_eq!(server.data().connection_updates.first(), Some(&Value::Null));
    assert_eq!(bridge.session().connection(), Some(Connection(ACCOUNT, 1)));

    bridge.connect().await?;
    assert_eq!(bridge.confirm().await?, Connection(ACCOUNT, 1));
    assert_eq!(queue_connection(&server)?, ConnectionStatus::from(Some(Connection(ACCOUNT, 1))));

    // The loop restores the connection when the queue forgets it.
    server.data().connection = Value::Null;
    wait_until(|| queue_connection(&server).is_ok_and(|status| status.connected)).await?;
    Ok(())
}

#[tokio::test]
async fn handles_queued_transaction() -> eyre::Result<()> {
    let wallet = Arc::new(StubWallet::new(1));
    let (server, bridge) = setup(wallet.clone()).await?;
    bridge.confirm().await?;

    server.data().transactions.push_back(json!({
        "id": "t1",
        "to": "0x70997970C51812dc3A010C7d01b50e0d17dc79C8",
        "value": "0x1",
        "chainId": "0xa"
    }));
    wait_until(|| bridge.staged().is_some()).await?;
    assert!(matches!(bridge.staged(), Some(PendingRequest::Transaction(tx)) if tx.id == "t1"));

    let outcome = bridge.send_signed().await?;
    assert_eq!(outcome.hash, Some(TX_HASH));
    assert!(outcome.receipt.is_some_and(|r| r.status));
    assert_eq!(wallet.chain(), 10);
    assert_eq!(wallet.sent()[0].chain_id, Some(10));

    similar_asserts::assert_eq!(
        server.data().transaction_responses,
        vec![json!({ "id": "t1", "hash": TX_HASH, "error": null })]
    );
    wait_until(|| bridge.staged().is_none()).await?;
    assert_eq!(bridge.outcome().map(|o| o.request_id), Some("t1".to_string()));
    Ok(())
}

#[tokio::test]
async fn handles_queued_signing_requests() -> eyre::Result<()> {
    let wallet = Arc::new(StubWallet::new(1));
    let (server, bridge) = setup(wallet).await?;
    bridge.confirm().await?;

    server.data().signings.push_back(json!({
        "id": "s1",
        "signType": "PersonalSign",
        "request": { "message": "hello", "address": ACCOUNT }
    }));
    wait_until(|| bridge.staged().is_some()).await?;
    let outcome = bridge.sign().await?;
    assert_eq!(outcome.signature, Some(Bytes::from_static(b"hello")));

    server.data().signings.push_back(json!({
        "id": "s2",
        "signType": "SignTypedDataV4",
        "request": { "message": "{}", "address": ACCOUNT }
    }));
    wait_until(|| bridge.staged().is_some_and(|r| r.id() == "s2")).await?;
    let err = bridge.sign().await.unwrap_err();
    assert!(matches!(err, BridgeError::ProviderRejected(_)), "{err:?}");

    let data = server.data();
    assert_eq!(data.signing_responses.len(), 2);
    assert_eq!(data.signing_responses[0]["signature"], json!("0x68656c6c6f"));
    assert_eq!(data.signing_responses[1]["signature"], Value::Null);
    assert_eq!(data.signing_responses[1]["error"], json!("User rejected the request."));
    Ok(())
}

#[tokio::test]
async fn unconfirmed_session_fetches_nothing() -> eyre::Result<()> {
    let wallet = Arc::new(StubWallet::new(1));
    let (server, bridge) = setup(wallet).await?;
    server.data().transactions.push_back(json!({ "id": "t1" }));
    server.data().connection = json!([ACCOUNT, 1]);

    // An unconfirmed session detaches itself from the queue and never stages requests.
    wait_until(|| queue_connection(&server).is_ok_and(|status| !status.connected)).await?;
    assert!(bridge.staged().is_none());
    assert!(matches!(bridge.send_signed().await, Err(BridgeError::NoPendingRequest(_))));
    Ok(())
}
