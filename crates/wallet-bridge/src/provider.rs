//! The wallet provider capability set.
//!
//! Mirrors the subset of an [EIP-1193](https://eips.ethereum.org/EIPS/eip-1193) provider the
//! bridge relies on. A concrete binding (an injected browser wallet, an embedded wallet, a test
//! double) implements [`WalletProvider`].

use crate::{chain::AddChainParams, types::TxReceipt};
use alloy_primitives::{Address, Bytes, ChainId, TxHash};
use alloy_rpc_types::TransactionRequest;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};
use tokio::sync::mpsc;

/// EIP-1193 code for a request the user rejected.
pub const USER_REJECTED_CODE: i64 = 4001;

/// EIP-3326 code returned by `wallet_switchEthereumChain` for a chain the wallet does not know.
pub const UNRECOGNIZED_CHAIN_CODE: i64 = 4902;

/// An error returned by a provider request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct ProviderError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ProviderError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), data: None }
    }

    pub fn user_rejected() -> Self {
        Self::new(USER_REJECTED_CODE, "User rejected the request.")
    }

    /// Returns `true` if the wallet refused a chain switch because it does not know the chain.
    ///
    /// Some wallets wrap the original error, so `data.originalError.code` is checked as well.
    pub fn is_unrecognized_chain(&self) -> bool {
        if self.code == UNRECOGNIZED_CHAIN_CODE {
            return true;
        }
        self.data
            .as_ref()
            .and_then(|data| data.pointer("/originalError/code"))
            .and_then(|code| code.as_i64())
            == Some(UNRECOGNIZED_CHAIN_CODE)
    }

    pub fn is_user_rejection(&self) -> bool {
        self.code == USER_REJECTED_CODE
    }
}

/// Events a provider pushes to its subscribers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProviderEvent {
    AccountsChanged(Vec<Address>),
    /// The new chain id, as reported by the provider (usually `0x`-prefixed hex).
    ChainChanged(String),
}

/// Identifies a listener registered with [`WalletProvider::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// A wallet provider.
#[async_trait]
pub trait WalletProvider: fmt::Debug + Send + Sync {
    /// `eth_requestAccounts`, prompting the user for permission if needed.
    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError>;

    /// `eth_accounts`, returning the already authorized accounts without prompting.
    async fn accounts(&self) -> Result<Vec<Address>, ProviderError>;

    /// `eth_chainId`, as the raw value the provider returned.
    async fn chain_id(&self) -> Result<String, ProviderError>;

    /// `wallet_switchEthereumChain`.
    async fn switch_chain(&self, chain_id: ChainId) -> Result<(), ProviderError>;

    /// `wallet_addEthereumChain`.
    async fn add_chain(&self, params: &AddChainParams) -> Result<(), ProviderError>;

    /// `personal_sign`.
    async fn personal_sign(&self, message: &str, address: Address) -> Result<Bytes, ProviderError>;

    /// `eth_signTypedData_v4`, with the typed data as its JSON encoding.
    async fn sign_typed_data(&self, address: Address, payload: &str)
    -> Result<Bytes, ProviderError>;

    /// `eth_sendTransaction`, returning the hash of the broadcast transaction.
    async fn send_transaction(&self, tx: TransactionRequest) -> Result<TxHash, ProviderError>;

    /// `eth_getTransactionReceipt`, `None` while the transaction is not yet included.
    async fn transaction_receipt(&self, hash: TxHash)
    -> Result<Option<TxReceipt>, ProviderError>;

    /// `wallet_revokePermissions` for `eth_accounts`. Wallets without support may ignore it.
    async fn revoke_permissions(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Registers `sink` for `accountsChanged` and `chainChanged` events.
    fn subscribe(&self, sink: mpsc::UnboundedSender<ProviderEvent>) -> SubscriptionId;

    /// Removes a listener registered with [`WalletProvider::subscribe`].
    fn unsubscribe(&self, id: SubscriptionId);
}

/// An active event subscription, removed from the provider when dropped.
#[derive(Debug)]
pub struct Subscription {
    provider: Arc<dyn WalletProvider>,
    id: SubscriptionId,
}

impl Subscription {
    /// Subscribes to `provider` and returns the guard together with the event stream.
    pub fn new(
        provider: Arc<dyn WalletProvider>,
    ) -> (Self, mpsc::UnboundedReceiver<ProviderEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = provider.subscribe(tx);
        (Self { provider, id }, rx)
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.provider.unsubscribe(self.id);
    }
}
