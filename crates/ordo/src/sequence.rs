//! Cluster-wide monotonic sequence used to number issuer generations.

use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::store::{self, Decision, KeySpace, PartitionedStore, StoreError, StoreKey};

pub trait SequenceGenerator: Send + Sync {
    /// Reserve `n` values; the returned range is `[from, from + n)`.
    fn next(&self, n: u64) -> Result<Range<i64>, StoreError>;
}

fn width(n: u64) -> Result<i64, StoreError> {
    i64::try_from(n).map_err(|_| StoreError::Backend {
        reason: format!("cannot reserve {n} sequence values"),
    })
}

/// Process-local sequence starting at 1.
#[derive(Debug)]
pub struct AtomicSequence {
    next: AtomicI64,
}

impl AtomicSequence {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: i64) -> Self {
        Self {
            next: AtomicI64::new(first),
        }
    }
}

impl Default for AtomicSequence {
    fn default() -> Self {
        Self::new()
    }
}

impl SequenceGenerator for AtomicSequence {
    fn next(&self, n: u64) -> Result<Range<i64>, StoreError> {
        let n = width(n)?;
        let from = self.next.fetch_add(n, Ordering::SeqCst);
        Ok(from..from + n)
    }
}

/// Sequence persisted in the store's `Sequences` key space.
///
/// Every node sharing the store draws from the same counter.
pub struct StoreSequence {
    store: Arc<dyn PartitionedStore>,
    key: StoreKey,
}

impl StoreSequence {
    pub fn new(store: Arc<dyn PartitionedStore>, name: impl Into<String>) -> Self {
        Self {
            store,
            key: StoreKey::Sequence(name.into()),
        }
    }
}

impl SequenceGenerator for StoreSequence {
    fn next(&self, n: u64) -> Result<Range<i64>, StoreError> {
        let n = width(n)?;
        // Absent counters are seeded first so `update` always has a value.
        store::insert_if_absent(self.store.as_ref(), KeySpace::Sequences, self.key.clone(), &1i64)?;
        let from = store::update::<i64, _, _>(
            self.store.as_ref(),
            KeySpace::Sequences,
            &self.key,
            |current| match current {
                Some(next) => {
                    let from = *next;
                    *next += n;
                    Decision::Write(Some(from))
                }
                None => Decision::Keep(None),
            },
        )?;
        from.map(|from| from..from + n).ok_or_else(|| StoreError::Backend {
            reason: "sequence counter vanished during reservation".to_string(),
        })
    }
}
