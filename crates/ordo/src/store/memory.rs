//! In-memory store backend for tests and single-node embedding.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam::channel::Sender;

use ordo_core::ContextId;

use super::{KeySpace, Mutation, PartitionedStore, StoreError, StoreKey};
use crate::lifecycle::LifecycleEvent;

/// A single-partition store backed by one ordered map.
///
/// Context inserts and removals can be published as [`LifecycleEvent`]s, the
/// way a clustered store reports entry events to the node that owns them.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<(KeySpace, StoreKey), Vec<u8>>>,
    unavailable: AtomicBool,
    notifier: Mutex<Option<Sender<LifecycleEvent>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_notifier(notifier: Sender<LifecycleEvent>) -> Self {
        let store = Self::new();
        store.set_notifier(Some(notifier));
        store
    }

    pub fn set_notifier(&self, notifier: Option<Sender<LifecycleEvent>>) {
        *self.notifier.lock().expect("memory store notifier poisoned") = notifier;
    }

    /// Make every operation fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn len(&self, space: KeySpace) -> usize {
        self.lock().keys().filter(|(s, _)| *s == space).count()
    }

    pub fn is_empty(&self, space: KeySpace) -> bool {
        self.len(space) == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<(KeySpace, StoreKey), Vec<u8>>> {
        self.entries.lock().expect("memory store poisoned")
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                reason: "memory store marked unavailable".to_string(),
            });
        }
        Ok(())
    }

    fn notify(&self, event: LifecycleEvent) {
        let notifier = self
            .notifier
            .lock()
            .expect("memory store notifier poisoned")
            .clone();
        if let Some(tx) = notifier
            && tx.send(event).is_err()
        {
            tracing::debug!("lifecycle listener gone, dropping store notification");
        }
    }

    fn context_of(space: KeySpace, key: &StoreKey) -> Option<ContextId> {
        match (space, key) {
            (KeySpace::Contexts, StoreKey::Context(id)) => Some(id.clone()),
            _ => None,
        }
    }
}

impl PartitionedStore for MemoryStore {
    fn get(&self, space: KeySpace, key: &StoreKey) -> Result<Option<Vec<u8>>, StoreError> {
        self.check_available()?;
        Ok(self.lock().get(&(space, key.clone())).cloned())
    }

    fn put(&self, space: KeySpace, key: StoreKey, value: Vec<u8>) -> Result<(), StoreError> {
        self.check_available()?;
        let inserted = Self::context_of(space, &key);
        let previous = self.lock().insert((space, key), value);
        if let (Some(context), None) = (inserted, previous) {
            self.notify(LifecycleEvent::Inserted(context));
        }
        Ok(())
    }

    fn put_if_absent(
        &self,
        space: KeySpace,
        key: StoreKey,
        value: Vec<u8>,
    ) -> Result<bool, StoreError> {
        self.check_available()?;
        let context = Self::context_of(space, &key);
        let written = {
            let mut entries = self.lock();
            let slot = (space, key);
            if entries.contains_key(&slot) {
                false
            } else {
                entries.insert(slot, value);
                true
            }
        };
        if written && let Some(context) = context {
            self.notify(LifecycleEvent::Inserted(context));
        }
        Ok(written)
    }

    fn transform(
        &self,
        space: KeySpace,
        key: &StoreKey,
        f: &mut dyn FnMut(Option<&[u8]>) -> Mutation,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        let mut entries = self.lock();
        let slot = (space, key.clone());
        match f(entries.get(&slot).map(Vec::as_slice)) {
            Mutation::Keep => {}
            Mutation::Put(bytes) => {
                entries.insert(slot, bytes);
            }
            Mutation::Remove => {
                entries.remove(&slot);
            }
        }
        Ok(())
    }

    fn remove(&self, space: KeySpace, key: &StoreKey) -> Result<bool, StoreError> {
        self.check_available()?;
        let removed = self.lock().remove(&(space, key.clone())).is_some();
        if removed && let Some(context) = Self::context_of(space, key) {
            self.notify(LifecycleEvent::Removed(context));
        }
        Ok(removed)
    }

    fn scan_keys(
        &self,
        space: KeySpace,
        filter: &dyn Fn(&StoreKey) -> bool,
    ) -> Result<Vec<StoreKey>, StoreError> {
        self.check_available()?;
        Ok(self
            .lock()
            .keys()
            .filter(|(s, key)| *s == space && filter(key))
            .map(|(_, key)| key.clone())
            .collect())
    }
}
