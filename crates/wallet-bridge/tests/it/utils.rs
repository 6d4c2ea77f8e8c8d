use alloy_primitives::{Address, Bytes, ChainId, TxHash, address, b256};
use alloy_rpc_types::TransactionRequest;
use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use foundry_wallet_bridge::{
    BridgeConfig, Discovery, ProviderError, ProviderEvent, WalletProvider,
    chain::AddChainParams,
    provider::SubscriptionId,
    queue::SESSION_TOKEN_HEADER,
    registry::{ProviderAnnouncement, ProviderInfo},
    types::TxReceipt,
};
use parking_lot::{Mutex, MutexGuard};
use serde_json::{Value, json};
use std::{collections::VecDeque, sync::Arc};
use tokio::{sync::mpsc, task::JoinHandle};
use url::Url;

pub const ACCOUNT: Address = address!("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
pub const TX_HASH: TxHash =
    b256!("0x0b3c1a5e7d9f2b4c6e8a0c2e4f6b8d0a1c3e5f7b9d1f3a5c7e9b1d3f5a7c9e1b");

/// What the mock queue server holds and what it was sent.
#[derive(Debug, Default)]
pub struct QueueData {
    pub connection: Value,
    pub connection_updates: Vec<Value>,
    pub transactions: VecDeque<Value>,
    pub signings: VecDeque<Value>,
    pub transaction_responses: Vec<Value>,
    pub signing_responses: Vec<Value>,
}

#[derive(Clone)]
struct ServerState {
    token: Option<String>,
    data: Arc<Mutex<QueueData>>,
}

/// A queue server on an ephemeral port, speaking the `/api` envelope protocol.
pub struct MockQueueServer {
    pub endpoint: Url,
    token: Option<String>,
    data: Arc<Mutex<QueueData>>,
    handle: JoinHandle<()>,
}

impl MockQueueServer {
    pub async fn spawn(token: Option<&str>) -> eyre::Result<Self> {
        let data = Arc::new(Mutex::new(QueueData::default()));
        let state = ServerState { token: token.map(str::to_string), data: data.clone() };

        let api = Router::new()
            .route("/connection", get(get_connection).post(post_connection))
            .route("/transaction/request", get(next_transaction))
            .route("/transaction/response", post(transaction_response))
            .route("/signing/request", get(next_signing))
            .route("/signing/response", post(signing_response))
            .route_layer(middleware::from_fn_with_state(state.clone(), require_session_token))
            .with_state(state);
        let app = Router::new().nest("/api", api);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let endpoint = format!("http://{}/", listener.local_addr()?).parse()?;
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self { endpoint, token: token.map(str::to_string), data, handle })
    }

    /// A config pointing at this server, polling fast enough for tests.
    pub fn config(&self) -> BridgeConfig {
        BridgeConfig {
            endpoint: self.endpoint.clone(),
            session_token: self.token.clone(),
            poll_interval_ms: 25,
            request_timeout_ms: 2_000,
            receipt_poll_interval_ms: 25,
            receipt_timeout_ms: 500,
        }
    }

    pub fn data(&self) -> MutexGuard<'_, QueueData> {
        self.data.lock()
    }
}

impl Drop for MockQueueServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn ok(data: Value) -> Json<Value> {
    Json(json!({ "status": "ok", "data": data }))
}

fn error(message: &str) -> Json<Value> {
    Json(json!({ "status": "error", "message": message }))
}

async fn require_session_token(
    State(state): State<ServerState>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if let Some(expected) = &state.token {
        let ok = req
            .headers()
            .get(SESSION_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == expected);
        if !ok {
            return Err(StatusCode::FORBIDDEN);
        }
    }
    Ok(next.run(req).await)
}

async fn get_connection(State(state): State<ServerState>) -> Json<Value> {
    ok(state.data.lock().connection.clone())
}

async fn post_connection(
    State(state): State<ServerState>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let mut data = state.data.lock();
    data.connection = body.clone();
    data.connection_updates.push(body);
    ok(Value::Null)
}

async fn next_transaction(State(state): State<ServerState>) -> Json<Value> {
    match state.data.lock().transactions.front() {
        Some(tx) => ok(tx.clone()),
        None => error("No pending transaction"),
    }
}

async fn transaction_response(
    State(state): State<ServerState>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let mut data = state.data.lock();
    data.transactions.retain(|tx| tx["id"] != body["id"]);
    data.transaction_responses.push(body);
    ok(Value::Null)
}

async fn next_signing(State(state): State<ServerState>) -> Json<Value> {
    match state.data.lock().signings.front() {
        Some(req) => ok(req.clone()),
        None => error("No pending signing request"),
    }
}

/// Answers with an empty body, which clients must accept as success.
async fn signing_response(State(state): State<ServerState>, Json(body): Json<Value>) -> StatusCode {
    let mut data = state.data.lock();
    data.signings.retain(|req| req["id"] != body["id"]);
    data.signing_responses.push(body);
    StatusCode::NO_CONTENT
}

/// A wallet on a fixed chain with a single authorized account.
#[derive(Debug)]
pub struct StubWallet {
    chain_id: Mutex<ChainId>,
    listeners: Mutex<Vec<(u64, mpsc::UnboundedSender<ProviderEvent>)>>,
    sent: Mutex<Vec<TransactionRequest>>,
}

impl StubWallet {
    pub fn new(chain_id: ChainId) -> Self {
        Self {
            chain_id: Mutex::new(chain_id),
            listeners: Default::default(),
            sent: Default::default(),
        }
    }

    pub fn sent(&self) -> Vec<TransactionRequest> {
        self.sent.lock().clone()
    }

    pub fn chain(&self) -> ChainId {
        *self.chain_id.lock()
    }
}

#[async_trait]
impl WalletProvider for StubWallet {
    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError> {
        Ok(vec![ACCOUNT])
    }

    async fn accounts(&self) -> Result<Vec<Address>, ProviderError> {
        Ok(vec![ACCOUNT])
    }

    async fn chain_id(&self) -> Result<String, ProviderError> {
        Ok(format!("{:#x}", self.chain()))
    }

    async fn switch_chain(&self, chain_id: ChainId) -> Result<(), ProviderError> {
        *self.chain_id.lock() = chain_id;
        for (_, listener) in self.listeners.lock().iter() {
            let _ = listener.send(ProviderEvent::ChainChanged(format!("{chain_id:#x}")));
        }
        Ok(())
    }

    async fn add_chain(&self, _params: &AddChainParams) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn personal_sign(&self, message: &str, _address: Address) -> Result<Bytes, ProviderError> {
        Ok(Bytes::copy_from_slice(message.as_bytes()))
    }

    async fn sign_typed_data(
        &self,
        _address: Address,
        _payload: &str,
    ) -> Result<Bytes, ProviderError> {
        Err(ProviderError::user_rejected())
    }

    async fn send_transaction(&self, tx: TransactionRequest) -> Result<TxHash, ProviderError> {
        self.sent.lock().push(tx);
        Ok(TX_HASH)
    }

    async fn transaction_receipt(
        &self,
        hash: TxHash,
    ) -> Result<Option<TxReceipt>, ProviderError> {
        Ok(Some(TxReceipt { transaction_hash: hash, block_number: Some(1), status: true }))
    }

    fn subscribe(&self, sink: mpsc::UnboundedSender<ProviderEvent>) -> SubscriptionId {
        let mut listeners = self.listeners.lock();
        let id = listeners.last().map_or(0, |(id, _)| id + 1);
        listeners.push((id, sink));
        SubscriptionId(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.listeners.lock().retain(|(listener, _)| *listener != id.0);
    }
}

/// Announces a fixed set of wallets whenever providers are requested.
#[derive(Default)]
pub struct StaticDiscovery {
    wallets: Vec<ProviderAnnouncement>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<ProviderAnnouncement>>>,
}

impl StaticDiscovery {
    pub fn new(wallets: Vec<(&str, Arc<StubWallet>)>) -> Self {
        let wallets = wallets
            .into_iter()
            .map(|(name, wallet)| ProviderAnnouncement {
                info: ProviderInfo {
                    uuid: uuid::Uuid::new_v4(),
                    name: name.to_string(),
                    icon: String::new(),
                    rdns: format!("test.{}", name.to_lowercase()),
                },
                provider: wallet,
            })
            .collect();
        Self { wallets, subscribers: Default::default() }
    }
}

impl Discovery for StaticDiscovery {
    fn request_providers(&self) {
        for subscriber in self.subscribers.lock().iter() {
            for wallet in &self.wallets {
                let _ = subscriber.send(wallet.clone());
            }
        }
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<ProviderAnnouncement> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }
}

/// Polls `condition` until it holds, failing after a few seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> eyre::Result<()> {
    tokio::time::timeout(std::time::Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    })
    .await
    .map_err(|_| eyre::eyre!("condition not met in time"))
}
