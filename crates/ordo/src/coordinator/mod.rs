//! Per-context coordinator.
//!
//! A coordinator issues tickets for submissions, persists their envelopes,
//! and drains its ticket books on the lane it is pinned to. All mutation of
//! its books and state happens under one mutex that is never held across a
//! store call.

mod books;
mod execute;
mod recovery;
mod state;
mod stats;

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use thiserror::Error;

use ordo_core::{
    CommandEnvelope, ContextId, EnvelopeKey, IssuerId, NodeId, PlacementStrategy, Transience,
    VersionMismatch,
};

use crate::clock;
use crate::command::Command;
use crate::config::CoordinatorConfig;
use crate::lane::{LaneHandle, LaneTask};
use crate::metrics;
use crate::oracle::OwnershipOracle;
use crate::sequence::SequenceGenerator;
use crate::store::{self, KeySpace, PartitionedStore, StoreError, StoreKey};

use books::TicketBooks;
use state::StateCell;
use stats::Counters;

pub use recovery::scan_backlog;
pub use state::CoordinatorState;
pub use stats::CoordinatorStats;

/// Collaborators shared by every coordinator of a registry.
pub(crate) struct Services {
    pub(crate) node: NodeId,
    pub(crate) store: Arc<dyn PartitionedStore>,
    pub(crate) oracle: Arc<dyn OwnershipOracle>,
    pub(crate) sequence: Arc<dyn SequenceGenerator>,
    pub(crate) settings: CoordinatorConfig,
}

pub(crate) type CoordinatorMap<C> = Mutex<HashMap<ContextId, Arc<Coordinator<C>>>>;

/// Result of a submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AcceptOutcome {
    Accepted {
        key: EnvelopeKey,
        placement: PlacementStrategy,
    },
    /// No live coordinator owns the context here, or the envelope could not
    /// be persisted.
    UnknownContext,
}

impl AcceptOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, AcceptOutcome::Accepted { .. })
    }

    pub fn key(&self) -> Option<&EnvelopeKey> {
        match self {
            AcceptOutcome::Accepted { key, .. } => Some(key),
            AcceptOutcome::UnknownContext => None,
        }
    }

    pub fn placement(&self) -> Option<PlacementStrategy> {
        match self {
            AcceptOutcome::Accepted { placement, .. } => Some(*placement),
            AcceptOutcome::UnknownContext => None,
        }
    }
}

/// Why a claim or batch could not go on. Never surfaces to submitters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CoordinatorError {
    #[error("coordinator for {context} stopped")]
    Stopped { context: ContextId },
    #[error("ownership of {context} lost")]
    OwnershipLost { context: ContextId },
    #[error("ownership of {context} in doubt")]
    OwnershipInDoubt { context: ContextId },
    #[error("context {context} does not exist")]
    ContextMissing { context: ContextId },
    #[error(transparent)]
    VersionMoved(#[from] VersionMismatch),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CoordinatorError {
    pub fn transience(&self) -> Transience {
        match self {
            CoordinatorError::OwnershipInDoubt { .. } => Transience::Retryable,
            CoordinatorError::Store(err) => err.transience(),
            CoordinatorError::Stopped { .. }
            | CoordinatorError::OwnershipLost { .. }
            | CoordinatorError::ContextMissing { .. }
            | CoordinatorError::VersionMoved(_) => Transience::Permanent,
        }
    }

    /// Whether the coordinator should park and try again rather than stop.
    fn should_retry(&self) -> bool {
        self.transience() != Transience::Permanent
    }
}

struct Inner {
    state: StateCell,
    books: TicketBooks,
    /// Declared placement; colocated until the context is claimed.
    placement: PlacementStrategy,
    version_seen: Option<i64>,
    batch_size: usize,
    counters: Counters,
}

pub struct Coordinator<C: Command> {
    context_id: ContextId,
    services: Arc<Services>,
    lane: LaneHandle,
    registry: Weak<CoordinatorMap<C>>,
    inner: Mutex<Inner>,
    _command: PhantomData<fn(C)>,
}

impl<C: Command> Coordinator<C> {
    /// A `New` coordinator submitting under a provisional issuer.
    pub(crate) fn new(
        context_id: ContextId,
        services: Arc<Services>,
        lane: LaneHandle,
        registry: Weak<CoordinatorMap<C>>,
    ) -> Result<Arc<Self>, StoreError> {
        let generation = services.sequence.next(1)?.start;
        let issuer = IssuerId::provisional(generation);
        let inner = Inner {
            state: StateCell::new(),
            books: TicketBooks::new(issuer, services.settings.recovery_interleave),
            placement: PlacementStrategy::Colocated,
            version_seen: None,
            batch_size: services.settings.batch_size.max(1),
            counters: Counters::default(),
        };
        tracing::debug!(
            context = %context_id,
            issuer = %issuer,
            lane = lane.index(),
            "coordinator created"
        );
        Ok(Arc::new(Self {
            context_id,
            services,
            lane,
            registry,
            inner: Mutex::new(inner),
            _command: PhantomData,
        }))
    }

    pub fn context_id(&self) -> &ContextId {
        &self.context_id
    }

    pub fn state(&self) -> CoordinatorState {
        self.lock().state.get()
    }

    pub fn stats(&self) -> CoordinatorStats {
        let inner = self.lock();
        let c = inner.counters;
        CoordinatorStats {
            context_id: self.context_id.clone(),
            state: inner.state.get(),
            issuer: inner.books.issuer(),
            version_seen: inner.version_seen,
            pending_tickets: inner.books.pending_len(),
            priority_tickets: inner.books.priority_len(),
            recovered_tickets: inner.books.recovered_len(),
            recovered_books: inner.books.recovered_books(),
            executed: c.executed,
            failed: c.failed,
            canceled: c.canceled,
            skipped: c.skipped,
            batches: c.batches,
            last_batch_ms: c.last_batch_ms,
            total_execution_ms: c.total_execution_ms,
            total_waiting_ms: c.total_waiting_ms,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("coordinator lock poisoned")
    }

    /// Issue a ticket, persist the envelope and wake the batch loop.
    pub(crate) fn accept(self: &Arc<Self>, command: C, priority: bool) -> AcceptOutcome {
        let ctx = &self.context_id;
        if !self.services.oracle.is_owned_by_this_node(ctx) {
            tracing::debug!(context = %ctx, "submission refused: context not owned here");
            return AcceptOutcome::UnknownContext;
        }

        let (ticket, placement) = {
            let mut inner = self.lock();
            if inner.state.get().is_stopped() {
                return AcceptOutcome::UnknownContext;
            }
            let ticket = inner.books.issue(priority);
            (ticket, PlacementStrategy::for_ticket(&ticket, inner.placement))
        };

        let key = EnvelopeKey::new(ctx.clone(), ticket);
        let envelope = CommandEnvelope::new(key.clone(), command, clock::now_ms());
        let persisted = store::insert(
            self.services.store.as_ref(),
            KeySpace::envelopes(placement),
            StoreKey::Envelope(key.clone()),
            &envelope,
        );

        let wake = {
            let mut inner = self.lock();
            inner.books.release(&ticket);
            self.wake_if_waiting(&mut inner)
        };
        if wake {
            self.schedule(Duration::ZERO);
        }

        match persisted {
            Ok(()) => {
                metrics::envelope_accepted(ctx, placement.as_str());
                tracing::debug!(context = %ctx, ticket = %ticket, placement = %placement, "envelope accepted");
                AcceptOutcome::Accepted { key, placement }
            }
            Err(err) => {
                tracing::warn!(context = %ctx, ticket = %ticket, error = %err, "envelope persist failed");
                AcceptOutcome::UnknownContext
            }
        }
    }

    /// `New -> Starting`. Returns whether this call started the coordinator.
    pub(crate) fn start(self: &Arc<Self>) -> bool {
        let starting = {
            let mut inner = self.lock();
            inner.state.get() == CoordinatorState::New
                && inner.state.set(CoordinatorState::Starting, &self.context_id)
        };
        if starting {
            self.schedule(Duration::ZERO);
        }
        starting
    }

    /// Stop for good and leave the registry.
    pub(crate) fn stop(self: &Arc<Self>, reason: &str) {
        let stopped_now = {
            let mut inner = self.lock();
            !inner.state.get().is_stopped()
                && inner.state.set(CoordinatorState::Stopped, &self.context_id)
        };
        if !stopped_now {
            return;
        }
        if let Some(map) = self.registry.upgrade() {
            let mut map = map.lock().expect("coordinator registry poisoned");
            if map
                .get(&self.context_id)
                .is_some_and(|current| Arc::ptr_eq(current, self))
            {
                map.remove(&self.context_id);
            }
            metrics::set_coordinators(map.len());
        }
        metrics::coordinator_stopped(&self.context_id);
        tracing::info!(context = %self.context_id, reason, "coordinator stopped");
    }

    fn wake_if_waiting(&self, inner: &mut Inner) -> bool {
        inner.state.get() == CoordinatorState::Waiting
            && inner.books.has_visible_work()
            && inner.state.set(CoordinatorState::Scheduled, &self.context_id)
    }

    fn schedule(self: &Arc<Self>, delay: Duration) {
        let task: Arc<dyn LaneTask> = self.clone();
        if !self.lane.schedule(task, delay) {
            tracing::warn!(context = %self.context_id, "lane closed, coordinator run dropped");
        }
    }

    /// Park in `state` and run again after the ownership retry delay.
    fn retry_later(self: &Arc<Self>, state: CoordinatorState) {
        let parked = {
            let mut inner = self.lock();
            !inner.state.get().is_stopped() && inner.state.set(state, &self.context_id)
        };
        if parked {
            metrics::ownership_retry(&self.context_id);
            let delay = Duration::from_millis(self.services.settings.ownership_retry_ms);
            tracing::debug!(context = %self.context_id, state = %state, ?delay, "retrying later");
            self.schedule(delay);
        }
    }
}

impl<C: Command> LaneTask for Coordinator<C> {
    fn run_on_lane(self: Arc<Self>) {
        let state = self.state();
        match state {
            CoordinatorState::Starting => self.claim(),
            CoordinatorState::Scheduled => self.run_batch(),
            other => {
                tracing::trace!(context = %self.context_id, state = %other, "stale lane wakeup");
            }
        }
    }
}
