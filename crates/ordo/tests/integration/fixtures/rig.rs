//! A single node over an in-memory store, with the store's insert and remove
//! notifications feeding the lifecycle loop.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use ordo::config::Config;
use ordo::core::{
    CommandEnvelope, ContextConfig, ContextId, ContextRecord, EnvelopeKey, NodeId,
    PlacementStrategy,
};
use ordo::store::{self, Decision};
use ordo::test_utils::poll_until;
use ordo::{
    CoordinatorStats, KeySpace, Lifecycle, MemoryStore, OwnershipTable, Registry, StoreKey,
    StoreSequence, run_lifecycle_loop,
};

use super::ops::{Ledger, Op};

pub const WAIT: Duration = Duration::from_secs(5);

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.lanes.parallelism = 2;
    config.lanes.name_prefix = "ordo-test-lane".to_string();
    config.coordinator.ownership_retry_ms = 25;
    config
}

pub fn ctx(name: &str) -> ContextId {
    ContextId::new(name).expect("context id")
}

pub struct Rig {
    pub store: Arc<MemoryStore>,
    pub oracle: Arc<OwnershipTable>,
    pub registry: Arc<Registry<Op>>,
    pub lifecycle: Arc<Lifecycle<Op>>,
    listener: Option<JoinHandle<()>>,
}

impl Rig {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Self {
        let (tx, rx) = crossbeam::channel::unbounded();
        let store = Arc::new(MemoryStore::with_notifier(tx));
        let oracle = Arc::new(OwnershipTable::owning_all());
        let sequence = Arc::new(StoreSequence::new(store.clone(), "issuers"));
        let registry = Arc::new(
            Registry::new(&config, store.clone(), oracle.clone(), sequence).expect("registry"),
        );
        let lifecycle = Arc::new(Lifecycle::new(registry.clone()));
        let listener = {
            let lifecycle = lifecycle.clone();
            std::thread::spawn(move || run_lifecycle_loop(&lifecycle, rx))
        };
        Self {
            store,
            oracle,
            registry,
            lifecycle,
            listener: Some(listener),
        }
    }

    /// Create a context and wait for its coordinator to claim it.
    pub fn create(&self, name: &str) -> ContextId {
        self.create_with(name, ContextConfig::default())
    }

    pub fn create_with(&self, name: &str, config: ContextConfig) -> ContextId {
        let id = ctx(name);
        self.registry
            .create_context(&id, config, Ledger::default())
            .expect("create context");
        assert!(
            self.wait_claimed(&id),
            "coordinator for {id} never claimed its context"
        );
        id
    }

    pub fn wait_claimed(&self, id: &ContextId) -> bool {
        poll_until(WAIT, || {
            self.stats(id)
                .is_some_and(|s| s.version_seen.is_some() && !s.state.is_stopped())
        })
    }

    pub fn stats(&self, id: &ContextId) -> Option<CoordinatorStats> {
        self.registry.stats(id)
    }

    pub fn record(&self, id: &ContextId) -> ContextRecord<Ledger> {
        self.registry
            .context(id)
            .expect("load context")
            .expect("context exists")
    }

    pub fn ledger(&self, id: &ContextId) -> Ledger {
        self.record(id).payload
    }

    /// Wait until `n` commands have been committed, executed or failed.
    pub fn wait_committed(&self, id: &ContextId, n: u64) -> bool {
        poll_until(WAIT, || {
            self.registry.context(id).ok().flatten().is_some_and(|r| {
                r.counters.total_commands_executed + r.counters.total_commands_failed >= n
            })
        })
    }

    pub fn wait_stopped(&self, id: &ContextId) -> bool {
        poll_until(WAIT, || self.registry.state(id).is_none())
    }

    /// Claim the context for some other node, as a takeover would.
    pub fn bump_version(&self, id: &ContextId) -> i64 {
        store::update::<ContextRecord<Ledger>, _, _>(
            self.store.as_ref(),
            KeySpace::Contexts,
            &StoreKey::Context(id.clone()),
            |record| match record {
                Some(record) => Decision::Write(record.claim(NodeId::random())),
                None => Decision::Keep(-1),
            },
        )
        .expect("bump version")
    }

    pub fn envelope(
        &self,
        key: &EnvelopeKey,
        placement: PlacementStrategy,
    ) -> Option<CommandEnvelope<Op>> {
        store::load(
            self.store.as_ref(),
            KeySpace::envelopes(placement),
            &StoreKey::Envelope(key.clone()),
        )
        .expect("load envelope")
    }

    pub fn envelope_count(&self) -> usize {
        self.store.len(KeySpace::ColocatedEnvelopes) + self.store.len(KeySpace::DistributedEnvelopes)
    }
}

impl Drop for Rig {
    fn drop(&mut self) {
        self.store.set_notifier(None);
        self.registry.shutdown();
        if let Some(listener) = self.listener.take() {
            let _ = listener.join();
        }
    }
}
