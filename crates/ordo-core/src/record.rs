//! Persisted context state and the optimistic commit protocol.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::envelope::PlacementStrategy;
use crate::error::VersionMismatch;
use crate::identity::{ContextId, IssuerId, NodeId};
use crate::ticket::Ticket;

/// Read-only configuration fixed when a context is created.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextConfig {
    #[serde(default)]
    pub placement: PlacementStrategy,
    /// Overrides the coordinator-wide batch size for this context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
}

impl ContextConfig {
    pub fn distributed() -> Self {
        Self {
            placement: PlacementStrategy::Distributed,
            batch_size: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionMark {
    pub issuer: IssuerId,
    pub sequence: i64,
}

/// Highest committed sequence per issuer.
///
/// Tickets of one issuer commit in sequence order, so a ticket at or below its
/// issuer's mark has already been committed and must not be applied again.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<ExecutionMark>", into = "Vec<ExecutionMark>")]
pub struct ExecutionMarks {
    by_issuer: BTreeMap<IssuerId, i64>,
}

impl ExecutionMarks {
    pub fn get(&self, issuer: IssuerId) -> Option<i64> {
        self.by_issuer.get(&issuer).copied()
    }

    pub fn covers(&self, ticket: &Ticket) -> bool {
        self.get(ticket.issuer())
            .is_some_and(|mark| ticket.sequence() <= mark)
    }

    pub fn record(&mut self, ticket: &Ticket) {
        let mark = self
            .by_issuer
            .entry(ticket.issuer())
            .or_insert(ticket.sequence());
        *mark = (*mark).max(ticket.sequence());
    }

    /// Forget issuers that can no longer produce tickets.
    pub fn retain_issuers(&mut self, mut keep: impl FnMut(IssuerId) -> bool) {
        self.by_issuer.retain(|issuer, _| keep(*issuer));
    }

    pub fn len(&self) -> usize {
        self.by_issuer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_issuer.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ExecutionMark> + '_ {
        self.by_issuer
            .iter()
            .map(|(issuer, sequence)| ExecutionMark {
                issuer: *issuer,
                sequence: *sequence,
            })
    }
}

impl From<Vec<ExecutionMark>> for ExecutionMarks {
    fn from(marks: Vec<ExecutionMark>) -> Self {
        let mut out = ExecutionMarks::default();
        for mark in marks {
            out.record(&Ticket::new(mark.issuer, mark.sequence));
        }
        out
    }
}

impl From<ExecutionMarks> for Vec<ExecutionMark> {
    fn from(marks: ExecutionMarks) -> Self {
        marks.iter().collect()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionCounters {
    pub total_commands_executed: u64,
    pub total_commands_failed: u64,
    pub total_execution_ms: u64,
    pub total_waiting_ms: u64,
}

/// How one ticket ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommitOutcomeKind {
    Executed { execution_ms: u64, waiting_ms: u64 },
    Failed { execution_ms: u64, waiting_ms: u64 },
}

/// Everything the coordinator writes back for one executed ticket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitRequest<P> {
    pub ticket: Ticket,
    /// Replacement payload; `None` leaves the payload untouched.
    pub payload: Option<P>,
    pub kind: CommitOutcomeKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    /// The ticket is at or below its issuer's mark; nothing was written.
    AlreadyCommitted,
}

/// Versioned state of one context.
///
/// `version` starts at 0 and moves by exactly one per ownership claim. Commits
/// never touch it; they are guarded by it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextRecord<P> {
    pub context_id: ContextId,
    pub payload: P,
    pub config: ContextConfig,
    pub version: i64,
    #[serde(default)]
    pub owner: Option<NodeId>,
    #[serde(default)]
    pub last_executed_ticket: Option<Ticket>,
    #[serde(default)]
    pub counters: ExecutionCounters,
    #[serde(default)]
    pub marks: ExecutionMarks,
}

impl<P> ContextRecord<P> {
    pub fn new(context_id: ContextId, config: ContextConfig, payload: P) -> Self {
        Self {
            context_id,
            payload,
            config,
            version: 0,
            owner: None,
            last_executed_ticket: None,
            counters: ExecutionCounters::default(),
            marks: ExecutionMarks::default(),
        }
    }

    /// Take ownership for `node` and return the new version.
    pub fn claim(&mut self, node: NodeId) -> i64 {
        // One step per ownership claim; unreachable in practice.
        self.version = self
            .version
            .checked_add(1)
            .expect("context version overflow");
        self.owner = Some(node);
        self.version
    }

    pub fn check_version(&self, seen: i64) -> Result<(), VersionMismatch> {
        if self.version == seen {
            Ok(())
        } else {
            Err(VersionMismatch {
                expected: seen,
                actual: self.version,
            })
        }
    }

    pub fn apply_commit(
        &mut self,
        seen: i64,
        request: CommitRequest<P>,
    ) -> Result<CommitOutcome, VersionMismatch> {
        self.check_version(seen)?;
        if self.marks.covers(&request.ticket) {
            return Ok(CommitOutcome::AlreadyCommitted);
        }
        let counters = &mut self.counters;
        match request.kind {
            CommitOutcomeKind::Executed {
                execution_ms,
                waiting_ms,
            } => {
                counters.total_commands_executed += 1;
                counters.total_execution_ms += execution_ms;
                counters.total_waiting_ms += waiting_ms;
                if let Some(payload) = request.payload {
                    self.payload = payload;
                }
                self.last_executed_ticket = Some(request.ticket);
            }
            CommitOutcomeKind::Failed {
                execution_ms,
                waiting_ms,
            } => {
                counters.total_commands_failed += 1;
                counters.total_execution_ms += execution_ms;
                counters.total_waiting_ms += waiting_ms;
            }
        }
        self.marks.record(&request.ticket);
        Ok(CommitOutcome::Committed)
    }
}
