//! # foundry-wallet-bridge
//!
//! Bridges a local signing-request queue to a browser wallet.
//!
//! The queue server publishes transactions and messages to sign; this crate discovers the
//! wallet providers the host environment announces, connects to one, and hands queued requests
//! to it one at a time:
//! 1. a provider is selected from the [`ProviderRegistry`]
//! 2. the user connects and confirms an account and chain, which are published to the queue
//! 3. the poll loop stages the next pending request
//! 4. the executor has the wallet sign or send it and reports the outcome to the queue
//!
//! The wallet itself is reached through the [`WalletProvider`] trait, an
//! [EIP-1193](https://eips.ethereum.org/EIPS/eip-1193) style capability set, so the concrete
//! browser binding lives outside this crate.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg))]

#[macro_use]
extern crate tracing;

pub mod bridge;
pub mod chain;
pub mod config;
pub mod error;
pub mod executor;
pub mod provider;
pub mod queue;
pub mod reconcile;
pub mod registry;
pub mod session;
pub mod state;
pub mod types;


pub use bridge::WalletBridge;
pub use chain::{ChainMeta, resolve};
pub use config::BridgeConfig;
pub use error::BridgeError;
pub use provider::{ProviderError, ProviderEvent, Subscription, WalletProvider};
pub use queue::{Queue, QueueClient};
pub use registry::{Discovery, EmbeddedWallet, ProviderRecord, ProviderRegistry};
pub use session::SessionState;
pub use types::{OutcomeRecord, PendingRequest};
