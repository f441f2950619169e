//! Coordinator registry: one live coordinator per context on this node, each
//! pinned to a lane of a shared pool.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use ordo_core::{
    CancelOutcome, CommandEnvelope, ContextConfig, ContextId, ContextRecord, EnvelopeKey, NodeId,
    PlacementStrategy,
};

use crate::command::Command;
use crate::config::Config;
use crate::coordinator::{
    AcceptOutcome, Coordinator, CoordinatorMap, CoordinatorState, CoordinatorStats, Services,
};
use crate::error::Result;
use crate::lane::LanePool;
use crate::metrics;
use crate::oracle::OwnershipOracle;
use crate::sequence::SequenceGenerator;
use crate::store::{self, Decision, KeySpace, PartitionedStore, StoreError, StoreKey};

/// Per-submission overrides.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SubmitOptions {
    /// Submit as priority even if the command does not ask for it.
    pub priority: bool,
    /// Create a coordinator for a context this node has not seen yet.
    /// `None` defers to `submission.accept_if_absent`.
    pub allow_absent: Option<bool>,
}

impl SubmitOptions {
    pub fn priority() -> Self {
        Self {
            priority: true,
            ..Self::default()
        }
    }

    pub fn allow_absent() -> Self {
        Self {
            allow_absent: Some(true),
            ..Self::default()
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}

pub struct Registry<C: Command> {
    services: Arc<Services>,
    lanes: LanePool,
    coordinators: Arc<CoordinatorMap<C>>,
    accept_if_absent: bool,
}

impl<C: Command> Registry<C> {
    pub fn new(
        config: &Config,
        store: Arc<dyn PartitionedStore>,
        oracle: Arc<dyn OwnershipOracle>,
        sequence: Arc<dyn SequenceGenerator>,
    ) -> Result<Self> {
        let node = config.node.id.unwrap_or_else(NodeId::random);
        let lanes = LanePool::new(config.lanes.parallelism, &config.lanes.name_prefix)?;
        tracing::info!(node = %node, lanes = lanes.len(), "registry started");
        Ok(Self {
            services: Arc::new(Services {
                node,
                store,
                oracle,
                sequence,
                settings: config.coordinator.clone(),
            }),
            lanes,
            coordinators: Arc::new(Mutex::new(HashMap::new())),
            accept_if_absent: config.submission.accept_if_absent,
        })
    }

    pub fn node(&self) -> NodeId {
        self.services.node
    }

    pub fn store(&self) -> &Arc<dyn PartitionedStore> {
        &self.services.store
    }

    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    pub fn accept(&self, context: &ContextId, command: C) -> AcceptOutcome {
        self.accept_with(context, command, SubmitOptions::default())
    }

    pub fn accept_with(
        &self,
        context: &ContextId,
        command: C,
        options: SubmitOptions,
    ) -> AcceptOutcome {
        let priority = options.priority || command.is_priority();
        let coordinator = match self.coordinator(context) {
            Some(coordinator) => coordinator,
            None if options.allow_absent.unwrap_or(self.accept_if_absent) => {
                match self.provision_for_submission(context) {
                    Ok(coordinator) => coordinator,
                    Err(err) => {
                        tracing::warn!(context = %context, error = %err, "coordinator provisioning failed");
                        return AcceptOutcome::UnknownContext;
                    }
                }
            }
            None => {
                tracing::debug!(context = %context, "no coordinator for submission");
                return AcceptOutcome::UnknownContext;
            }
        };
        coordinator.accept(command, priority)
    }

    /// Cancel a pending envelope. Envelopes already started are left to run.
    pub fn cancel(
        &self,
        key: &EnvelopeKey,
        placement: PlacementStrategy,
    ) -> std::result::Result<CancelOutcome, StoreError> {
        let outcome = store::update::<CommandEnvelope<C>, _, _>(
            self.services.store.as_ref(),
            KeySpace::envelopes(placement),
            &StoreKey::Envelope(key.clone()),
            |envelope| match envelope {
                None => Decision::Keep(CancelOutcome::NotFound),
                Some(envelope) => match envelope.cancel() {
                    CancelOutcome::Canceled => Decision::Write(CancelOutcome::Canceled),
                    other => Decision::Keep(other),
                },
            },
        )?;
        tracing::debug!(envelope = %key, outcome = ?outcome, "cancel requested");
        Ok(outcome)
    }

    /// First writer wins. The store's insert notification starts the
    /// coordinator on whichever node owns the context.
    pub fn create_context(
        &self,
        context: &ContextId,
        config: ContextConfig,
        payload: C::Context,
    ) -> std::result::Result<CreateOutcome, StoreError> {
        let record = ContextRecord::new(context.clone(), config, payload);
        let created = store::insert_if_absent(
            self.services.store.as_ref(),
            KeySpace::Contexts,
            StoreKey::Context(context.clone()),
            &record,
        )?;
        if created {
            tracing::info!(context = %context, placement = %record.config.placement, "context created");
            Ok(CreateOutcome::Created)
        } else {
            Ok(CreateOutcome::AlreadyExists)
        }
    }

    pub fn context(
        &self,
        context: &ContextId,
    ) -> std::result::Result<Option<ContextRecord<C::Context>>, StoreError> {
        store::load(
            self.services.store.as_ref(),
            KeySpace::Contexts,
            &StoreKey::Context(context.clone()),
        )
    }

    /// Create the coordinator if needed and start it if it is still `New`.
    /// Returns whether this call started it.
    pub fn start_coordinator(&self, context: &ContextId) -> std::result::Result<bool, StoreError> {
        let coordinator = self.provision(context)?;
        Ok(coordinator.start())
    }

    /// Returns whether a coordinator was registered.
    pub fn stop_coordinator(&self, context: &ContextId, reason: &str) -> bool {
        match self.coordinator(context) {
            Some(coordinator) => {
                coordinator.stop(reason);
                true
            }
            None => false,
        }
    }

    pub fn state(&self, context: &ContextId) -> Option<CoordinatorState> {
        self.coordinator(context).map(|c| c.state())
    }

    pub fn stats(&self, context: &ContextId) -> Option<CoordinatorStats> {
        self.coordinator(context).map(|c| c.stats())
    }

    pub fn all_stats(&self) -> Vec<CoordinatorStats> {
        let coordinators: Vec<_> = self.map().values().cloned().collect();
        let mut stats: Vec<_> = coordinators.iter().map(|c| c.stats()).collect();
        stats.sort_by(|a, b| a.context_id.cmp(&b.context_id));
        stats
    }

    pub fn coordinator_count(&self) -> usize {
        self.map().len()
    }

    /// Stop every coordinator, then the lanes.
    pub fn shutdown(&self) {
        let coordinators: Vec<_> = self.map().values().cloned().collect();
        for coordinator in coordinators {
            coordinator.stop("shutdown");
        }
        self.lanes.shutdown();
        tracing::info!(node = %self.services.node, "registry shut down");
    }

    pub(crate) fn coordinator(&self, context: &ContextId) -> Option<Arc<Coordinator<C>>> {
        self.map().get(context).cloned()
    }

    fn map(&self) -> MutexGuard<'_, HashMap<ContextId, Arc<Coordinator<C>>>> {
        self.coordinators
            .lock()
            .expect("coordinator registry poisoned")
    }

    /// The registered coordinator, or a fresh `New` one.
    fn provision(&self, context: &ContextId) -> std::result::Result<Arc<Coordinator<C>>, StoreError> {
        if let Some(existing) = self.coordinator(context)
            && !existing.state().is_stopped()
        {
            return Ok(existing);
        }
        // Built outside the map lock; the sequence may live in the store.
        let fresh = Coordinator::new(
            context.clone(),
            self.services.clone(),
            self.lanes.lane_for(context),
            Arc::downgrade(&self.coordinators),
        )?;
        let mut map = self.map();
        let coordinator = match map.get(context) {
            Some(existing) if !existing.state().is_stopped() => existing.clone(),
            _ => {
                map.insert(context.clone(), fresh.clone());
                metrics::set_coordinators(map.len());
                fresh
            }
        };
        Ok(coordinator)
    }

    /// A submission against a context with no coordinator. If the record is
    /// already there the coordinator starts at once; otherwise it collects
    /// provisional tickets until the insert notification arrives.
    fn provision_for_submission(
        &self,
        context: &ContextId,
    ) -> std::result::Result<Arc<Coordinator<C>>, StoreError> {
        let coordinator = self.provision(context)?;
        if coordinator.state() == CoordinatorState::New
            && self
                .services
                .store
                .get(KeySpace::Contexts, &StoreKey::Context(context.clone()))?
                .is_some()
        {
            coordinator.start();
        }
        Ok(coordinator)
    }
}
