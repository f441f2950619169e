//! Envelope bookkeeping shared by the machines.

/// Stored state of one envelope, by ticket index.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum Slot {
    Pending,
    Started,
    Gone,
}

/// Where a recovery scan starts: the lowest ticket still stored, or `len`
/// when nothing is left.
pub fn backlog_start(slots: &[Slot]) -> usize {
    slots
        .iter()
        .position(|slot| *slot != Slot::Gone)
        .unwrap_or(slots.len())
}

/// Execution marks cover every ticket at or below the highest commit.
pub fn covered(mark: Option<usize>, ticket: usize) -> bool {
    mark.is_some_and(|mark| ticket <= mark)
}
