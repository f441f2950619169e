use serde::{Deserialize, Serialize};

use ordo_core::{ContextId, IssuerId};

use super::state::CoordinatorState;

/// Point-in-time copy of a coordinator's diagnostics.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorStats {
    pub context_id: ContextId,
    pub state: CoordinatorState,
    pub issuer: IssuerId,
    pub version_seen: Option<i64>,
    pub pending_tickets: u64,
    pub priority_tickets: u64,
    pub recovered_tickets: u64,
    pub recovered_books: usize,
    pub executed: u64,
    pub failed: u64,
    pub canceled: u64,
    pub skipped: u64,
    pub batches: u64,
    pub last_batch_ms: u64,
    pub total_execution_ms: u64,
    pub total_waiting_ms: u64,
}

/// Counters accumulated inside the coordinator lock.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct Counters {
    pub(crate) executed: u64,
    pub(crate) failed: u64,
    pub(crate) canceled: u64,
    pub(crate) skipped: u64,
    pub(crate) batches: u64,
    pub(crate) last_batch_ms: u64,
    pub(crate) total_execution_ms: u64,
    pub(crate) total_waiting_ms: u64,
}

impl Counters {
    pub(crate) fn absorb(&mut self, batch: &Counters) {
        self.executed += batch.executed;
        self.failed += batch.failed;
        self.canceled += batch.canceled;
        self.skipped += batch.skipped;
        self.batches += batch.batches;
        self.last_batch_ms = batch.last_batch_ms;
        self.total_execution_ms += batch.total_execution_ms;
        self.total_waiting_ms += batch.total_waiting_ms;
    }
}
