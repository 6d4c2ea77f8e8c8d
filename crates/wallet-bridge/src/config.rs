//! Bridge configuration.

use crate::error::BridgeError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Default address of the local queue server.
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:9545";

/// File read by [`BridgeConfig::load`] from the current directory, if present.
pub const CONFIG_FILE: &str = "wallet-bridge.toml";

/// Prefix of the environment variables read by [`BridgeConfig::load`].
pub const ENV_PREFIX: &str = "FOUNDRY_WALLET_BRIDGE_";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Base URL of the queue server.
    pub endpoint: Url,
    /// Token sent with every queue request.
    pub session_token: Option<String>,
    pub poll_interval_ms: u64,
    /// Upper bound for a single queue request.
    pub request_timeout_ms: u64,
    pub receipt_poll_interval_ms: u64,
    /// How long to wait for a receipt after broadcasting a transaction.
    pub receipt_timeout_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            endpoint: Url::parse(DEFAULT_ENDPOINT).expect("valid default endpoint"),
            session_token: None,
            poll_interval_ms: 1_000,
            request_timeout_ms: 10_000,
            receipt_poll_interval_ms: 1_000,
            receipt_timeout_ms: 120_000,
        }
    }
}

impl BridgeConfig {
    /// Loads the configuration from the defaults, [`CONFIG_FILE`] and `FOUNDRY_WALLET_BRIDGE_*`
    /// environment variables, later sources taking precedence.
    pub fn load() -> Result<Self, BridgeError> {
        Ok(Self::figment().extract()?)
    }

    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_interval_ms.max(1))
    }

    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_millis(self.receipt_timeout_ms)
    }
}
