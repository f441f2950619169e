//! Partitioned key-value store interface.
//!
//! The store is an external collaborator. The runtime needs per-key atomic
//! read-modify-write, first-writer-wins insert and a key scan; everything
//! above that lives in the typed helpers at the bottom of this module.

mod memory;

pub use memory::MemoryStore;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use ordo_core::{ContextId, Effect, EnvelopeKey, PlacementStrategy, Transience};

use crate::codec;

/// Logical key spaces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeySpace {
    Contexts,
    /// Envelopes partitioned with their context record.
    ColocatedEnvelopes,
    /// Envelopes partitioned on their own key.
    DistributedEnvelopes,
    /// Envelopes of failed commands, and raw bytes of envelopes that no
    /// longer decode.
    DeadLetters,
    Sequences,
}

ordo_core::enum_str! {
    impl KeySpace {
        pub fn as_str(&self) -> &'static str;
        pub fn parse_str(raw: &str) -> Option<Self>;
        variants {
            Contexts => ["contexts"],
            ColocatedEnvelopes => ["colocated_envelopes"],
            DistributedEnvelopes => ["distributed_envelopes"],
            DeadLetters => ["dead_letters"],
            Sequences => ["sequences"],
        }
    }
}

impl KeySpace {
    pub fn envelopes(placement: PlacementStrategy) -> Self {
        match placement {
            PlacementStrategy::Colocated => KeySpace::ColocatedEnvelopes,
            PlacementStrategy::Distributed => KeySpace::DistributedEnvelopes,
        }
    }

    /// Whether keys in this space are partitioned with their context.
    pub fn is_context_affine(self) -> bool {
        matches!(self, KeySpace::Contexts | KeySpace::ColocatedEnvelopes)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StoreKey {
    Context(ContextId),
    Envelope(EnvelopeKey),
    Sequence(String),
}

impl StoreKey {
    pub fn context(&self) -> Option<&ContextId> {
        match self {
            StoreKey::Context(id) => Some(id),
            StoreKey::Envelope(key) => Some(&key.context),
            StoreKey::Sequence(_) => None,
        }
    }

    /// Partition association for `space`. Keys sharing an association are
    /// placed on the same partition.
    pub fn affinity(&self, space: KeySpace) -> Option<&ContextId> {
        if space.is_context_affine() {
            self.context()
        } else {
            None
        }
    }
}

/// What a [`PartitionedStore::transform`] closure wants done with the entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mutation {
    Keep,
    Put(Vec<u8>),
    Remove,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// Partition unreachable or mid-move.
    #[error("store unavailable: {reason}")]
    Unavailable { reason: String },
    #[error("codec failure in {space}: {source}")]
    Codec {
        space: KeySpace,
        #[source]
        source: serde_json::Error,
    },
    #[error("store backend error: {reason}")]
    Backend { reason: String },
}

impl StoreError {
    pub fn transience(&self) -> Transience {
        match self {
            StoreError::Unavailable { .. } => Transience::Retryable,
            StoreError::Codec { .. } => Transience::Permanent,
            StoreError::Backend { .. } => Transience::Unknown,
        }
    }

    pub fn effect(&self) -> Effect {
        match self {
            StoreError::Unavailable { .. } | StoreError::Codec { .. } => Effect::None,
            StoreError::Backend { .. } => Effect::Unknown,
        }
    }
}

/// Per-key atomic storage, partitioned by key with an affinity hint.
///
/// `transform` runs `f` against the current value and applies its mutation
/// atomically. Implementations may call `f` more than once on contention; only
/// the last call's mutation takes effect.
pub trait PartitionedStore: Send + Sync {
    fn get(&self, space: KeySpace, key: &StoreKey) -> Result<Option<Vec<u8>>, StoreError>;

    fn put(&self, space: KeySpace, key: StoreKey, value: Vec<u8>) -> Result<(), StoreError>;

    /// First writer wins. Returns whether `value` was written.
    fn put_if_absent(
        &self,
        space: KeySpace,
        key: StoreKey,
        value: Vec<u8>,
    ) -> Result<bool, StoreError>;

    fn transform(
        &self,
        space: KeySpace,
        key: &StoreKey,
        f: &mut dyn FnMut(Option<&[u8]>) -> Mutation,
    ) -> Result<(), StoreError>;

    /// Returns whether an entry was removed.
    fn remove(&self, space: KeySpace, key: &StoreKey) -> Result<bool, StoreError>;

    /// Keys in `space` accepted by `filter`, in key order.
    fn scan_keys(
        &self,
        space: KeySpace,
        filter: &dyn Fn(&StoreKey) -> bool,
    ) -> Result<Vec<StoreKey>, StoreError>;
}

/// Outcome of a typed [`update`] closure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision<R> {
    /// Write the (possibly modified) value back.
    Write(R),
    /// Leave the stored value as it was.
    Keep(R),
    Remove(R),
}

pub fn load<T: DeserializeOwned>(
    store: &dyn PartitionedStore,
    space: KeySpace,
    key: &StoreKey,
) -> Result<Option<T>, StoreError> {
    store
        .get(space, key)?
        .map(|bytes| codec::decode(space, &bytes))
        .transpose()
}

pub fn insert<T: Serialize>(
    store: &dyn PartitionedStore,
    space: KeySpace,
    key: StoreKey,
    value: &T,
) -> Result<(), StoreError> {
    store.put(space, key, codec::encode(space, value)?)
}

pub fn insert_if_absent<T: Serialize>(
    store: &dyn PartitionedStore,
    space: KeySpace,
    key: StoreKey,
    value: &T,
) -> Result<bool, StoreError> {
    store.put_if_absent(space, key, codec::encode(space, value)?)
}

/// Atomically decode, modify and re-encode one entry.
///
/// `f` sees `None` when the key is absent; `Decision::Write` on an absent key
/// is a no-op.
pub fn update<T, R, F>(
    store: &dyn PartitionedStore,
    space: KeySpace,
    key: &StoreKey,
    mut f: F,
) -> Result<R, StoreError>
where
    T: Serialize + DeserializeOwned,
    F: FnMut(Option<&mut T>) -> Decision<R>,
{
    let mut result: Option<Result<R, StoreError>> = None;
    store.transform(space, key, &mut |current| {
        let mut value = match current.map(|bytes| codec::decode::<T>(space, bytes)).transpose() {
            Ok(value) => value,
            Err(err) => {
                result = Some(Err(err));
                return Mutation::Keep;
            }
        };
        let (mutation, out) = match f(value.as_mut()) {
            Decision::Keep(out) => (Mutation::Keep, out),
            Decision::Remove(out) => (Mutation::Remove, out),
            Decision::Write(out) => match value.as_ref().map(|v| codec::encode(space, v)) {
                None => (Mutation::Keep, out),
                Some(Ok(bytes)) => (Mutation::Put(bytes), out),
                Some(Err(err)) => {
                    result = Some(Err(err));
                    return Mutation::Keep;
                }
            },
        };
        result = Some(Ok(out));
        mutation
    })?;
    result.unwrap_or_else(|| {
        Err(StoreError::Backend {
            reason: format!("transform on {space} never invoked its closure"),
        })
    })
}
