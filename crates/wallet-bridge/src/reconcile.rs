//! The poll loop keeping the bridge and the queue in sync.
//!
//! Every tick first reconciles the queue's view of the wallet connection with the local session,
//! then, for a confirmed session, looks for the next pending request. Transactions take priority
//! over signing requests when both queues have something pending.

use crate::{
    error::BridgeError,
    queue::Queue,
    state::SharedState,
    types::{PendingRequest, RequestKind},
};
use std::{sync::Arc, time::Duration};
use tokio::{sync::Notify, task::JoinHandle, time::MissedTickBehavior};

/// Queues polled when nothing is staged, in priority order.
static POLL_ORDER: [RequestKind; 2] = [RequestKind::Transaction, RequestKind::Signing];

#[derive(Clone, Debug)]
pub struct Reconciler {
    queue: Arc<dyn Queue>,
    state: SharedState,
    repoll: Arc<Notify>,
}

impl Reconciler {
    pub fn new(queue: Arc<dyn Queue>, state: SharedState) -> Self {
        Self { queue, state, repoll: Arc::new(Notify::new()) }
    }

    /// Asks a running loop to tick now instead of waiting for the next interval.
    pub fn request_repoll(&self) {
        self.repoll.notify_one();
    }

    /// Runs a single reconciliation round. Failures are logged and retried on the next tick.
    pub async fn tick(&self) {
        if let Err(err) = self.sync_connection().await {
            warn!(target: "wallet_bridge::reconcile", %err, "failed to sync connection");
        }
        if let Err(err) = self.fetch_pending().await {
            warn!(target: "wallet_bridge::reconcile", %err, "failed to fetch pending request");
        }
    }

    /// Makes the queue's view of the connection match the local session.
    pub async fn sync_connection(&self) -> Result<(), BridgeError> {
        let (epoch, local) = {
            let state = self.state.lock();
            (state.epoch(), state.session.attached_connection())
        };

        let remote = self.queue.connection().await?;
        if self.state.lock().epoch() != epoch {
            return Ok(());
        }

        match local {
            None if remote.connected => {
                debug!(target: "wallet_bridge::reconcile", "clearing stale queue connection");
                self.queue.set_connection(None).await
            }
            Some(connection) if remote.differs_from(&connection) => {
                debug!(
                    target: "wallet_bridge::reconcile",
                    account = %connection.0,
                    chain_id = connection.1,
                    "publishing connection"
                );
                self.queue.set_connection(Some(connection)).await
            }
            _ => Ok(()),
        }
    }

    /// Stages the next pending request, if the session is confirmed and the executor is idle.
    pub async fn fetch_pending(&self) -> Result<(), BridgeError> {
        let (epoch, kinds) = {
            let state = self.state.lock();
            if !state.session.confirmed || state.in_flight() {
                return Ok(());
            }
            // While a request waits for the user only its own queue is watched, so a request of
            // the other kind cannot displace it.
            let kinds: &[RequestKind] = match state.staged().map(PendingRequest::kind) {
                Some(RequestKind::Transaction) => &POLL_ORDER[..1],
                Some(RequestKind::Signing) => &POLL_ORDER[1..],
                None => &POLL_ORDER,
            };
            (state.epoch(), kinds)
        };

        for kind in kinds {
            let next = match kind {
                RequestKind::Transaction => {
                    self.queue.next_transaction().await?.map(PendingRequest::Transaction)
                }
                RequestKind::Signing => {
                    self.queue.next_signing().await?.map(PendingRequest::Signing)
                }
            };
            let Some(request) = next else { continue };

            let mut state = self.state.lock();
            if state.epoch() != epoch {
                return Ok(());
            }
            let id = request.id().to_string();
            if state.is_resolved(&id) {
                // Answered already; the queue has not caught up yet. Look at the next queue.
                trace!(target: "wallet_bridge::reconcile", %kind, id, "skipping answered request");
                continue;
            }
            if state.stage(request) {
                debug!(target: "wallet_bridge::reconcile", %kind, id, "staged pending request");
            }
            return Ok(());
        }

        let mut state = self.state.lock();
        if state.epoch() == epoch && state.queue_empty() {
            debug!(target: "wallet_bridge::reconcile", "pending request withdrawn by the queue");
        }
        Ok(())
    }

    /// Spawns the poll loop, ticking every `period` and whenever a re-poll is requested.
    pub fn spawn(self, period: Duration) -> PollHandle {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = self.repoll.notified() => {
                        trace!(target: "wallet_bridge::reconcile", "re-poll requested");
                    }
                }
                self.tick().await;
            }
        });
        PollHandle(handle)
    }
}

/// Handle to a running poll loop, stopping it when dropped.
#[derive(Debug)]
pub struct PollHandle(JoinHandle<()>);

impl PollHandle {
    pub fn is_running(&self) -> bool {
        !self.0.is_finished()
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.0.abort();
    }
}
