//! Discovery of wallet providers announced by the host environment.
//!
//! Providers announce themselves in the [EIP-6963](https://eips.ethereum.org/EIPS/eip-6963)
//! style: the registry broadcasts a discovery request and collects every announcement, keeping
//! the first one seen for each provider id.

use crate::provider::WalletProvider;
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    sync::{Arc, OnceLock},
};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Metadata a provider announces about itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderInfo {
    pub uuid: Uuid,
    pub name: String,
    /// Data URI of the wallet icon.
    pub icon: String,
    /// Reverse DNS name of the wallet, e.g. `io.metamask`.
    pub rdns: String,
}

/// An announcement received from the host environment.
#[derive(Clone, Debug)]
pub struct ProviderAnnouncement {
    pub info: ProviderInfo,
    pub provider: Arc<dyn WalletProvider>,
}

/// A discovered provider.
#[derive(Clone)]
pub struct ProviderRecord {
    pub id: Uuid,
    pub name: String,
    pub rdns: String,
    pub icon: String,
    pub provider: Arc<dyn WalletProvider>,
}

impl fmt::Debug for ProviderRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRecord")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("rdns", &self.rdns)
            .finish_non_exhaustive()
    }
}

impl From<ProviderAnnouncement> for ProviderRecord {
    fn from(announcement: ProviderAnnouncement) -> Self {
        let ProviderAnnouncement { info, provider } = announcement;
        Self { id: info.uuid, name: info.name, rdns: info.rdns, icon: info.icon, provider }
    }
}

/// The announcement channel of the host environment.
pub trait Discovery: Send + Sync {
    /// Asks every provider to announce itself again.
    fn request_providers(&self);

    /// Subscribes to provider announcements.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<ProviderAnnouncement>;
}

/// A wallet bundled with the bridge, created on first use.
///
/// The same handle can be passed to any number of registries; the wallet is only created once.
pub struct EmbeddedWallet {
    init: Box<dyn Fn() -> ProviderAnnouncement + Send + Sync>,
    wallet: OnceLock<ProviderAnnouncement>,
}

impl EmbeddedWallet {
    pub fn new(init: impl Fn() -> ProviderAnnouncement + Send + Sync + 'static) -> Self {
        Self { init: Box::new(init), wallet: OnceLock::new() }
    }

    /// Returns the wallet, creating it if needed.
    pub fn get_or_init(&self) -> &ProviderAnnouncement {
        self.wallet.get_or_init(|| (self.init)())
    }

    pub fn is_initialized(&self) -> bool {
        self.wallet.get().is_some()
    }
}

impl fmt::Debug for EmbeddedWallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddedWallet").field("wallet", &self.wallet.get()).finish()
    }
}

/// The deduplicated list of known providers, in announcement order.
pub struct ProviderRegistry {
    discovery: Arc<dyn Discovery>,
    announcements: mpsc::UnboundedReceiver<ProviderAnnouncement>,
    providers: Vec<ProviderRecord>,
}

impl ProviderRegistry {
    /// Subscribes to announcements and broadcasts a discovery request.
    ///
    /// An embedded wallet, if given, is created now and listed first.
    pub fn new(discovery: Arc<dyn Discovery>, embedded: Option<&EmbeddedWallet>) -> Self {
        let announcements = discovery.subscribe();
        let mut registry = Self { discovery, announcements, providers: Vec::new() };
        if let Some(embedded) = embedded {
            registry.announce(embedded.get_or_init().clone());
        }
        registry.discovery.request_providers();
        registry
    }

    /// Adds an announced provider. Returns `false` if a provider with the same id is known.
    pub fn announce(&mut self, announcement: ProviderAnnouncement) -> bool {
        let id = announcement.info.uuid;
        if self.get(id).is_some() {
            trace!(target: "wallet_bridge::registry", %id, "ignoring duplicate announcement");
            return false;
        }
        debug!(
            target: "wallet_bridge::registry",
            %id,
            name = %announcement.info.name,
            rdns = %announcement.info.rdns,
            "provider announced"
        );
        self.providers.push(announcement.into());
        true
    }

    /// Drains announcements received since the last call. Returns the number of new providers.
    pub fn poll_announcements(&mut self) -> usize {
        let mut added = 0;
        while let Ok(announcement) = self.announcements.try_recv() {
            added += usize::from(self.announce(announcement));
        }
        added
    }

    /// Broadcasts a new discovery request and collects what has arrived so far.
    pub fn refresh(&mut self) -> usize {
        self.discovery.request_providers();
        self.poll_announcements()
    }

    pub fn list(&self) -> &[ProviderRecord] {
        &self.providers
    }

    pub fn get(&self, id: Uuid) -> Option<&ProviderRecord> {
        self.providers.iter().find(|record| record.id == id)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry").field("providers", &self.providers).finish_non_exhaustive()
    }
}
