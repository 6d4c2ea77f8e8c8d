//! Drives the wallet through a staged request and reports the outcome to the queue.

use crate::{
    chain::{ensure_chain_selected, parse_chain_id_str},
    config::BridgeConfig,
    error::BridgeError,
    provider::WalletProvider,
    queue::Queue,
    reconcile::Reconciler,
    state::SharedState,
    types::{
        BrowserTransaction, OutcomeRecord, PendingRequest, RequestKind, SignRequest, SignResponse,
        SignType, TransactionResponse, TxReceipt,
    },
};
use alloy_primitives::{Address, ChainId, TxHash};
use alloy_rpc_types::{TransactionInput, TransactionRequest};
use std::{sync::Arc, time::Duration};
use tokio::time::Instant;

#[derive(Clone, Debug)]
pub struct Executor {
    queue: Arc<dyn Queue>,
    state: SharedState,
    reconciler: Reconciler,
    receipt_poll_interval: Duration,
    receipt_timeout: Duration,
}

impl Executor {
    pub fn new(
        queue: Arc<dyn Queue>,
        state: SharedState,
        reconciler: Reconciler,
        config: &BridgeConfig,
    ) -> Self {
        Self {
            queue,
            state,
            reconciler,
            receipt_poll_interval: config.receipt_poll_interval(),
            receipt_timeout: config.receipt_timeout(),
        }
    }

    /// Signs the staged signing request.
    pub async fn sign(&self, provider: &dyn WalletProvider) -> Result<OutcomeRecord, BridgeError> {
        let claimed = self.state.lock().claim(RequestKind::Signing)?;
        self.run(provider, claimed).await
    }

    /// Signs and broadcasts the staged transaction.
    pub async fn send_signed(
        &self,
        provider: &dyn WalletProvider,
    ) -> Result<OutcomeRecord, BridgeError> {
        let claimed = self.state.lock().claim(RequestKind::Transaction)?;
        self.run(provider, claimed).await
    }

    async fn run(
        &self,
        provider: &dyn WalletProvider,
        (request, epoch): (PendingRequest, u64),
    ) -> Result<OutcomeRecord, BridgeError> {
        match request {
            PendingRequest::Signing(request) => self.run_signing(provider, request, epoch).await,
            PendingRequest::Transaction(tx) => self.run_transaction(provider, tx, epoch).await,
        }
    }

    async fn run_signing(
        &self,
        provider: &dyn WalletProvider,
        request: SignRequest,
        epoch: u64,
    ) -> Result<OutcomeRecord, BridgeError> {
        let SignRequest { id, sign_type, request: payload } = request;
        debug!(target: "wallet_bridge::executor", id, ?sign_type, "signing");

        let result = match sign_type {
            SignType::PersonalSign => provider.personal_sign(&payload.message, payload.address).await,
            SignType::SignTypedDataV4 => {
                provider.sign_typed_data(payload.address, &payload.message).await
            }
        };
        self.ensure_current(epoch)?;

        let outcome = OutcomeRecord {
            signature: result.as_ref().ok().cloned(),
            error: result.as_ref().err().map(ToString::to_string),
            ..OutcomeRecord::new(&id)
        };
        let response =
            SignResponse { id, signature: outcome.signature.clone(), error: outcome.error.clone() };
        let pushed = self.queue.respond_signing(&response).await;
        self.finish(epoch, &outcome);

        pushed?;
        result?;
        Ok(outcome)
    }

    async fn run_transaction(
        &self,
        provider: &dyn WalletProvider,
        tx: BrowserTransaction,
        epoch: u64,
    ) -> Result<OutcomeRecord, BridgeError> {
        debug!(target: "wallet_bridge::executor", id = tx.id, "sending transaction");

        let result = self.submit(provider, &tx, epoch).await;
        self.ensure_current(epoch)?;

        let mut outcome = OutcomeRecord {
            hash: result.as_ref().ok().copied(),
            error: result.as_ref().err().map(ToString::to_string),
            ..OutcomeRecord::new(&tx.id)
        };
        let response =
            TransactionResponse { id: tx.id.clone(), hash: outcome.hash, error: outcome.error.clone() };
        let pushed = self.queue.respond_transaction(&response).await;
        self.finish(epoch, &outcome);

        // A broadcast transaction is followed up even when the queue missed the response.
        if let Ok(hash) = result {
            outcome.receipt = self.await_receipt(provider, &tx.id, hash).await;
        }
        pushed?;
        result?;
        Ok(outcome)
    }

    /// Switches to the transaction's chain and broadcasts it, returning its hash.
    async fn submit(
        &self,
        provider: &dyn WalletProvider,
        tx: &BrowserTransaction,
        epoch: u64,
    ) -> Result<TxHash, BridgeError> {
        let (account, current_chain) = {
            let state = self.state.lock();
            (state.session.account, state.session.chain_id)
        };
        let account = account.ok_or(BridgeError::NotConnected)?;
        if let Some(declared) = tx.request.from {
            if declared != account {
                return Err(BridgeError::SenderMismatch { expected: account, declared });
            }
        }

        let want = tx.chain_id().or(current_chain);
        ensure_chain_selected(provider, want, current_chain).await?;

        // The switch may have moved the wallet, so read the chain back before sending.
        let chain_id = parse_chain_id_str(&provider.chain_id().await?);
        {
            let mut state = self.state.lock();
            if state.epoch() == epoch {
                state.session.set_chain_id(chain_id);
            }
        }
        if let Some(expected) = want {
            if chain_id != Some(expected) {
                return Err(BridgeError::WrongChain { expected, actual: chain_id });
            }
        }

        let request = build_transaction(&tx.request, account, chain_id);
        let hash = provider.send_transaction(request).await?;
        debug!(target: "wallet_bridge::executor", id = tx.id, %hash, "transaction broadcast");
        Ok(hash)
    }

    /// Waits for the receipt of a broadcast transaction, giving up after the receipt timeout.
    async fn await_receipt(
        &self,
        provider: &dyn WalletProvider,
        request_id: &str,
        hash: TxHash,
    ) -> Option<TxReceipt> {
        let deadline = Instant::now() + self.receipt_timeout;
        loop {
            match provider.transaction_receipt(hash).await {
                Ok(Some(receipt)) => {
                    self.state.lock().record_receipt(request_id, receipt);
                    return Some(receipt);
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(target: "wallet_bridge::executor", %hash, %err, "failed to fetch receipt");
                }
            }
            if Instant::now() >= deadline {
                warn!(target: "wallet_bridge::executor", %hash, "timed out waiting for receipt");
                return None;
            }
            tokio::time::sleep(self.receipt_poll_interval).await;
        }
    }

    fn ensure_current(&self, epoch: u64) -> Result<(), BridgeError> {
        if self.state.lock().epoch() != epoch {
            debug!(target: "wallet_bridge::executor", "session reset, dropping request");
            return Err(BridgeError::Discarded);
        }
        Ok(())
    }

    /// Stores the outcome, frees the request slot and asks the poll loop to look for the next
    /// request right away.
    fn finish(&self, epoch: u64, outcome: &OutcomeRecord) {
        {
            let mut state = self.state.lock();
            state.record(epoch, |record| *record = outcome.clone());
            state.release(epoch);
        }
        self.reconciler.request_repoll();
    }
}

/// Builds the transaction handed to the wallet.
///
/// Unset fields stay unset. EIP-1559 fees win over a legacy gas price, the two are never sent
/// together.
fn build_transaction(
    fields: &TransactionRequest,
    from: Address,
    chain_id: Option<ChainId>,
) -> TransactionRequest {
    let input = fields.input.input().cloned();
    let mut tx = TransactionRequest {
        from: Some(from),
        to: fields.to,
        value: fields.value,
        gas: fields.gas,
        nonce: fields.nonce,
        chain_id,
        input: TransactionInput { input: input.clone(), data: input },
        ..Default::default()
    };
    if fields.max_fee_per_gas.is_some() || fields.max_priority_fee_per_gas.is_some() {
        tx.max_fee_per_gas = fields.max_fee_per_gas;
        tx.max_priority_fee_per_gas = fields.max_priority_fee_per_gas;
    } else {
        tx.gas_price = fields.gas_price;
    }
    tx
}
