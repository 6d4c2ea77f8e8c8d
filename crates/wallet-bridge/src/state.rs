use crate::{
    error::BridgeError,
    session::SessionState,
    types::{OutcomeRecord, PendingRequest, RequestKind, TxReceipt},
};
use parking_lot::Mutex;
use std::{collections::HashSet, sync::Arc};
use uuid::Uuid;

/// State shared by the poll loop, the request executor and the event pump.
pub type SharedState = Arc<Mutex<BridgeState>>;

/// Everything the bridge knows about the current session.
///
/// At most one request is staged at a time. A staged request is either waiting for the user or,
/// once claimed, owned by the executor until its outcome has been pushed. The poll loop never
/// replaces a claimed request.
#[derive(Debug, Default)]
pub struct BridgeState {
    pub session: SessionState,
    staged: Option<PendingRequest>,
    in_flight: bool,
    /// Requests this session already answered. The queue may keep offering them until it has
    /// processed the response, or forever if the response was lost.
    resolved: HashSet<String>,
    outcome: Option<OutcomeRecord>,
    /// Bumped whenever the staged request is dropped without an answer. Request work started
    /// under an older epoch is discarded.
    epoch: u64,
    /// Bumped only when a new session starts. Account and chain updates from an older session
    /// are discarded.
    session_epoch: u64,
}

impl BridgeState {
    pub fn shared() -> SharedState {
        Arc::new(Mutex::new(Self::default()))
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn session_epoch(&self) -> u64 {
        self.session_epoch
    }

    pub fn staged(&self) -> Option<&PendingRequest> {
        self.staged.as_ref()
    }

    /// Returns `true` while the executor owns the staged request.
    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn outcome(&self) -> Option<&OutcomeRecord> {
        self.outcome.as_ref()
    }

    /// Starts over with a fresh session for `provider`, dropping any staged request.
    pub fn reset(&mut self, provider: Option<Uuid>) {
        *self = Self {
            session: SessionState::for_provider(provider),
            epoch: self.epoch + 1,
            session_epoch: self.session_epoch + 1,
            ..Default::default()
        };
    }

    /// Drops the staged request without reporting anything to the queue. The session itself is
    /// kept.
    pub fn discard_request(&mut self) {
        self.staged = None;
        self.in_flight = false;
        self.epoch += 1;
    }

    /// Returns `true` if the request with this id was already answered in this session.
    pub fn is_resolved(&self, id: &str) -> bool {
        self.resolved.contains(id)
    }

    /// Stages a request fetched from the queue.
    ///
    /// Returns `false` if nothing changed: the executor owns the staged request, the request is
    /// already staged, or it was already answered.
    pub fn stage(&mut self, request: PendingRequest) -> bool {
        if self.in_flight
            || self.staged.as_ref().is_some_and(|staged| staged.id() == request.id())
            || self.is_resolved(request.id())
        {
            return false;
        }
        self.staged = Some(request);
        self.outcome = None;
        true
    }

    /// Handles a queue with nothing new to offer. Returns `true` if a waiting request was
    /// dropped because the queue no longer offers it.
    pub fn queue_empty(&mut self) -> bool {
        if self.in_flight {
            return false;
        }
        self.staged.take().is_some()
    }

    /// Hands the staged request of the given kind to the executor.
    pub fn claim(&mut self, kind: RequestKind) -> Result<(PendingRequest, u64), BridgeError> {
        match &self.staged {
            Some(request) if !self.in_flight && request.kind() == kind => {
                self.in_flight = true;
                self.outcome = Some(OutcomeRecord::new(request.id()));
                Ok((request.clone(), self.epoch))
            }
            _ => Err(BridgeError::NoPendingRequest(kind.as_str())),
        }
    }

    /// Updates the outcome of the claimed request, unless the session was torn down since.
    pub fn record(&mut self, epoch: u64, update: impl FnOnce(&mut OutcomeRecord)) -> bool {
        if epoch != self.epoch {
            return false;
        }
        match &mut self.outcome {
            Some(outcome) => {
                update(outcome);
                true
            }
            None => false,
        }
    }

    /// Records the receipt of `request_id`, unless a newer request replaced its outcome.
    pub fn record_receipt(&mut self, request_id: &str, receipt: TxReceipt) -> bool {
        match &mut self.outcome {
            Some(outcome) if outcome.request_id == request_id => {
                outcome.receipt = Some(receipt);
                true
            }
            _ => false,
        }
    }

    /// Releases the claimed request once its outcome has been pushed, successfully or not. The
    /// request is never staged again in this session.
    pub fn release(&mut self, epoch: u64) {
        if epoch == self.epoch {
            if let Some(request) = self.staged.take() {
                self.resolved.insert(request.id().to_string());
            }
            self.in_flight = false;
        }
    }
}
