//! Account and chain of the selected wallet.

use crate::{
    chain::{ChainMeta, parse_chain_id_str, resolve},
    provider::ProviderEvent,
    types::Connection,
};
use alloy_primitives::{Address, ChainId};
use uuid::Uuid;

/// Connection state of the selected wallet.
///
/// Moves from disconnected, to connected once an account and a chain are known, to confirmed
/// once the connection has been published to the queue.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionState {
    pub selected_provider: Option<Uuid>,
    pub account: Option<Address>,
    pub chain_id: Option<ChainId>,
    /// Metadata of `chain_id`, if it is a known chain.
    pub chain: Option<&'static ChainMeta>,
    /// Set once the queue has been told about `account` and `chain_id`. While set, provider
    /// events no longer change them.
    pub confirmed: bool,
}

impl SessionState {
    /// A fresh session for the given provider.
    pub fn for_provider(selected_provider: Option<Uuid>) -> Self {
        Self { selected_provider, ..Default::default() }
    }

    /// The current connection, if both an account and a chain are known.
    pub fn connection(&self) -> Option<Connection> {
        Some(Connection(self.account?, self.chain_id?))
    }

    pub fn is_connected(&self) -> bool {
        self.connection().is_some()
    }

    /// The connection the queue should see: only a confirmed session is attached.
    pub fn attached_connection(&self) -> Option<Connection> {
        self.connection().filter(|_| self.confirmed)
    }

    /// Sets the account to the first of `accounts`. An empty list means no account.
    pub fn set_accounts(&mut self, accounts: &[Address]) {
        self.account = accounts.first().copied();
    }

    pub fn set_chain_id(&mut self, chain_id: Option<ChainId>) {
        self.chain_id = chain_id;
        self.chain = chain_id.and_then(resolve);
    }

    /// Sets the chain from a raw provider value, clearing it if it does not parse.
    pub fn set_raw_chain_id(&mut self, raw: &str) {
        self.set_chain_id(parse_chain_id_str(raw));
    }

    /// Applies a provider event. Returns `false` if the event was ignored because the session
    /// is already confirmed.
    pub fn apply_event(&mut self, event: &ProviderEvent) -> bool {
        if self.confirmed {
            return false;
        }
        match event {
            ProviderEvent::AccountsChanged(accounts) => self.set_accounts(accounts),
            ProviderEvent::ChainChanged(raw) => self.set_raw_chain_id(raw),
        }
        true
    }

    /// Clears the account and the confirmation, keeping the provider selection.
    pub fn disconnect(&mut self) {
        self.account = None;
        self.confirmed = false;
    }
}
