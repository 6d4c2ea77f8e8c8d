use crate::provider::ProviderError;
use alloy_primitives::Address;

/// Errors produced while bridging the request queue and the wallet provider.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The user declined, or the provider failed the request.
    #[error(transparent)]
    ProviderRejected(#[from] ProviderError),
    /// No metadata is known for the chain, so it cannot be registered with the wallet.
    #[error("Unknown chainId {0}")]
    UnknownChain(u64),
    /// The queued request names a sender other than the connected account.
    #[error("Sender mismatch: request is from {declared} but the connected account is {expected}")]
    SenderMismatch { expected: Address, declared: Address },
    /// The queue server could not be reached or answered with a failure status.
    #[error("API request failed: {0}")]
    Network(String),
    /// The queue server answered with a body that could not be decoded.
    #[error("Invalid JSON response: {0}")]
    InvalidResponse(String),
    /// The queue server understood the call but refused it.
    #[error("queue server rejected the request: {0}")]
    QueueRejected(String),
    #[error("no wallet provider selected")]
    NoProviderSelected,
    #[error("wallet is not connected")]
    NotConnected,
    #[error("no pending {0} request")]
    NoPendingRequest(&'static str),
    /// The wallet is not on the chain the transaction has to be sent on.
    #[error("wallet is on chain {actual:?}, expected chain {expected}")]
    WrongChain { expected: u64, actual: Option<u64> },
    /// The session was reset while the request was being handled.
    #[error("request discarded: the session was reset")]
    Discarded,
    #[error(transparent)]
    Config(#[from] figment::Error),
    /// A configured value the queue client cannot use.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl BridgeError {
    /// Returns `true` for failures that are expected to clear up on the next poll.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::InvalidResponse(_))
    }
}

impl From<reqwest::Error> for BridgeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}
