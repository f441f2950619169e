use serde::{Deserialize, Serialize};

/// Coordinator lifecycle.
///
/// `New -> Starting -> {Waiting | Scheduled} -> Executing -> ... -> Stopped`.
/// Stopped is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatorState {
    /// Not yet claimed; submissions use a provisional issuer.
    New,
    /// Claim and recovery queued or in progress.
    Starting,
    /// Idle, nothing visible to execute.
    Waiting,
    /// Queued on the lane.
    Scheduled,
    /// Batch loop running.
    Executing,
    Stopped,
}

ordo_core::enum_str! {
    impl CoordinatorState {
        pub fn as_str(&self) -> &'static str;
        pub fn parse_str(raw: &str) -> Option<Self>;
        variants {
            New => ["new"],
            Starting => ["starting"],
            Waiting => ["waiting"],
            Scheduled => ["scheduled"],
            Executing => ["executing"],
            Stopped => ["stopped"],
        }
    }
}

impl CoordinatorState {
    pub fn is_stopped(self) -> bool {
        self == CoordinatorState::Stopped
    }
}

/// Holder that refuses to leave `Stopped`.
#[derive(Debug)]
pub(crate) struct StateCell(CoordinatorState);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(CoordinatorState::New)
    }

    pub(crate) fn get(&self) -> CoordinatorState {
        self.0
    }

    /// Returns false (and logs) when the cell is already stopped.
    pub(crate) fn set(&mut self, next: CoordinatorState, context: &ordo_core::ContextId) -> bool {
        if self.0.is_stopped() && !next.is_stopped() {
            tracing::warn!(
                context = %context,
                rejected = %next,
                "state change after stop rejected"
            );
            return false;
        }
        self.0 = next;
        true
    }
}
