//! The host tying provider selection, the session, the poll loop and the executor together.

use crate::{
    chain::parse_chain_id_str,
    config::BridgeConfig,
    error::BridgeError,
    executor::Executor,
    provider::{Subscription, WalletProvider},
    queue::{Queue, QueueClient},
    reconcile::{PollHandle, Reconciler},
    registry::{ProviderRecord, ProviderRegistry},
    session::SessionState,
    state::{BridgeState, SharedState},
    types::{Connection, OutcomeRecord, PendingRequest},
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Bridges the request queue to the selected wallet provider.
///
/// Exposes read-only snapshots of its state and the user actions `connect`, `confirm`,
/// `disconnect`, `sign` and `send_signed`. The poll loop runs from the moment a provider is
/// selected until the next selection or until the bridge is dropped.
#[derive(Debug)]
pub struct WalletBridge {
    config: BridgeConfig,
    registry: ProviderRegistry,
    state: SharedState,
    queue: Arc<dyn Queue>,
    reconciler: Reconciler,
    executor: Executor,
    provider: Option<Arc<dyn WalletProvider>>,
    subscription: Option<Subscription>,
    events: Option<JoinHandle<()>>,
    poll: Option<PollHandle>,
}

impl WalletBridge {
    /// Creates a bridge talking to the queue server at `config.endpoint`.
    pub fn new(config: BridgeConfig, registry: ProviderRegistry) -> Result<Self, BridgeError> {
        let queue = Arc::new(QueueClient::new(&config)?);
        Ok(Self::with_queue(config, registry, queue))
    }

    pub fn with_queue(
        config: BridgeConfig,
        registry: ProviderRegistry,
        queue: Arc<dyn Queue>,
    ) -> Self {
        let state = BridgeState::shared();
        let reconciler = Reconciler::new(queue.clone(), state.clone());
        let executor = Executor::new(queue.clone(), state.clone(), reconciler.clone(), &config);
        Self {
            config,
            registry,
            state,
            queue,
            reconciler,
            executor,
            provider: None,
            subscription: None,
            events: None,
            poll: None,
        }
    }

    /// Collects new provider announcements and selects the only provider if there is exactly
    /// one and nothing is selected yet.
    pub async fn refresh_providers(&mut self) -> Result<(), BridgeError> {
        self.registry.refresh();
        if self.provider.is_none() && self.registry.len() == 1 {
            let id = self.registry.list()[0].id;
            debug!(target: "wallet_bridge::bridge", %id, "auto-selecting the only provider");
            self.select_provider(id).await?;
        }
        Ok(())
    }

    /// Switches to the provider with the given id.
    ///
    /// The previous session is torn down without reporting anything for a request in flight.
    /// The queue is told the wallet disconnected, then the account and chain the new provider
    /// already authorized are read without prompting the user.
    pub async fn select_provider(&mut self, id: Uuid) -> Result<(), BridgeError> {
        let provider =
            self.registry.get(id).ok_or(BridgeError::NoProviderSelected)?.provider.clone();
        self.teardown();

        let session = {
            let mut state = self.state.lock();
            state.reset(Some(id));
            state.session_epoch()
        };
        debug!(target: "wallet_bridge::bridge", %id, "selected provider");

        if let Err(err) = self.queue.set_connection(None).await {
            warn!(target: "wallet_bridge::bridge", %err, "failed to clear queue connection");
        }

        let (subscription, mut events) = Subscription::new(provider.clone());
        let state = self.state.clone();
        self.events = Some(tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let mut guard = state.lock();
                if guard.session_epoch() != session {
                    break;
                }
                if !guard.session.apply_event(&event) {
                    debug!(target: "wallet_bridge::bridge", ?event, "ignoring event, session confirmed");
                }
            }
        }));
        self.subscription = Some(subscription);
        self.provider = Some(provider.clone());

        self.refresh_session(provider.as_ref(), session).await;
        self.poll = Some(self.reconciler.clone().spawn(self.config.poll_interval()));
        Ok(())
    }

    /// Reads the authorized accounts and the current chain without prompting. Failures clear the
    /// corresponding field.
    async fn refresh_session(&self, provider: &dyn WalletProvider, session: u64) {
        let chain_id = match provider.chain_id().await {
            Ok(raw) => parse_chain_id_str(&raw),
            Err(err) => {
                debug!(target: "wallet_bridge::bridge", %err, "failed to read chain id");
                None
            }
        };
        let accounts = provider.accounts().await.unwrap_or_else(|err| {
            debug!(target: "wallet_bridge::bridge", %err, "failed to read accounts");
            Vec::new()
        });

        let mut state = self.state.lock();
        if state.session_epoch() == session {
            state.session.set_chain_id(chain_id);
            state.session.set_accounts(&accounts);
        }
    }

    /// Asks the wallet for its accounts, prompting the user if needed, and reads its chain.
    ///
    /// Only the account request has to succeed; a chain that cannot be read is left unset.
    /// Connecting again drops a previous confirmation.
    pub async fn connect(&self) -> Result<SessionState, BridgeError> {
        let provider = self.selected()?;
        let session = self.state.lock().session_epoch();

        let accounts = provider.request_accounts().await?;
        let chain_id = match provider.chain_id().await {
            Ok(raw) => Some(raw),
            Err(err) => {
                debug!(target: "wallet_bridge::bridge", %err, "failed to read chain id");
                None
            }
        };

        let mut state = self.state.lock();
        if state.session_epoch() != session {
            return Err(BridgeError::Discarded);
        }
        state.session.set_accounts(&accounts);
        match chain_id {
            Some(raw) => state.session.set_raw_chain_id(&raw),
            None => state.session.set_chain_id(None),
        }
        state.session.confirmed = false;
        debug!(
            target: "wallet_bridge::bridge",
            account = ?state.session.account,
            chain_id = ?state.session.chain_id,
            "connected"
        );
        Ok(state.session.clone())
    }

    /// Publishes the current account and chain to the queue and freezes them.
    ///
    /// Nothing changes if the queue cannot be reached; the caller may retry.
    pub async fn confirm(&self) -> Result<Connection, BridgeError> {
        let (epoch, connection) = {
            let state = self.state.lock();
            (state.epoch(), state.session.connection().ok_or(BridgeError::NotConnected)?)
        };

        self.queue.set_connection(Some(connection)).await?;

        let mut state = self.state.lock();
        if state.epoch() != epoch {
            return Err(BridgeError::Discarded);
        }
        state.session.confirmed = true;
        drop(state);
        debug!(
            target: "wallet_bridge::bridge",
            account = %connection.0,
            chain_id = connection.1,
            "confirmed"
        );

        self.reconciler.request_repoll();
        Ok(connection)
    }

    /// Forgets the account and any staged request and tells the wallet and the queue.
    pub async fn disconnect(&self) -> Result<(), BridgeError> {
        let provider = self.selected()?;
        {
            let mut state = self.state.lock();
            state.session.disconnect();
            state.discard_request();
        }

        if let Err(err) = provider.revoke_permissions().await {
            debug!(target: "wallet_bridge::bridge", %err, "failed to revoke permissions");
        }
        if let Err(err) = self.queue.set_connection(None).await {
            warn!(target: "wallet_bridge::bridge", %err, "failed to clear queue connection");
        }
        Ok(())
    }

    /// Signs the staged signing request.
    pub async fn sign(&self) -> Result<OutcomeRecord, BridgeError> {
        let provider = self.selected()?;
        self.executor.sign(provider.as_ref()).await
    }

    /// Signs and broadcasts the staged transaction.
    pub async fn send_signed(&self) -> Result<OutcomeRecord, BridgeError> {
        let provider = self.selected()?;
        self.executor.send_signed(provider.as_ref()).await
    }

    pub fn providers(&self) -> &[ProviderRecord] {
        self.registry.list()
    }

    pub fn session(&self) -> SessionState {
        self.state.lock().session.clone()
    }

    pub fn staged(&self) -> Option<PendingRequest> {
        self.state.lock().staged().cloned()
    }

    pub fn outcome(&self) -> Option<OutcomeRecord> {
        self.state.lock().outcome().cloned()
    }

    pub fn is_polling(&self) -> bool {
        self.poll.as_ref().is_some_and(PollHandle::is_running)
    }

    fn selected(&self) -> Result<Arc<dyn WalletProvider>, BridgeError> {
        self.provider.clone().ok_or(BridgeError::NoProviderSelected)
    }

    fn teardown(&mut self) {
        self.poll = None;
        self.subscription = None;
        if let Some(events) = self.events.take() {
            events.abort();
        }
        self.provider = None;
    }
}

impl Drop for WalletBridge {
    fn drop(&mut self) {
        self.teardown();
    }
}
