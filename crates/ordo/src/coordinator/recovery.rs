//! Rebuilding a context's backlog from the envelopes left in the store.

use std::collections::BTreeMap;

use ordo_core::{ContextId, IssuerId, TicketBook};

use crate::store::{KeySpace, PartitionedStore, StoreError, StoreKey};

/// Scan both envelope key spaces for `context` and group what is left into one
/// book per issuer, in service order.
///
/// Only keys are read. Gaps inside an issuer's run (tickets already executed,
/// or never persisted) stay in the book and are skipped at execution time.
pub fn scan_backlog(
    store: &dyn PartitionedStore,
    context: &ContextId,
) -> Result<Vec<TicketBook>, StoreError> {
    let mut by_issuer: BTreeMap<IssuerId, Vec<i64>> = BTreeMap::new();
    for space in [KeySpace::ColocatedEnvelopes, KeySpace::DistributedEnvelopes] {
        let keys = store.scan_keys(space, &|key| key.context() == Some(context))?;
        for key in keys {
            if let StoreKey::Envelope(envelope) = key {
                by_issuer
                    .entry(envelope.ticket.issuer())
                    .or_default()
                    .push(envelope.ticket.sequence());
            }
        }
    }
    Ok(by_issuer
        .into_iter()
        .filter_map(|(issuer, sequences)| TicketBook::covering(issuer, sequences))
        .collect())
}
