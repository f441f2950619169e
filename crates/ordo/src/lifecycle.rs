//! Store notifications driving coordinator start and stop.

use std::sync::Arc;

use crossbeam::channel::Receiver;

use ordo_core::ContextId;

use crate::command::Command;
use crate::registry::Registry;

/// What the store reports about a context entry on this node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The entry was created here.
    Inserted(ContextId),
    /// The entry's partition moved to this node.
    Arrived(ContextId),
    Removed(ContextId),
    /// The entry's partition is leaving this node.
    Departed(ContextId),
}

impl LifecycleEvent {
    pub fn context_id(&self) -> &ContextId {
        match self {
            LifecycleEvent::Inserted(id)
            | LifecycleEvent::Arrived(id)
            | LifecycleEvent::Removed(id)
            | LifecycleEvent::Departed(id) => id,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            LifecycleEvent::Inserted(_) => "inserted",
            LifecycleEvent::Arrived(_) => "arrived",
            LifecycleEvent::Removed(_) => "removed",
            LifecycleEvent::Departed(_) => "departed",
        }
    }
}

pub struct Lifecycle<C: Command> {
    registry: Arc<Registry<C>>,
}

impl<C: Command> Lifecycle<C> {
    pub fn new(registry: Arc<Registry<C>>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<Registry<C>> {
        &self.registry
    }

    pub fn handle(&self, event: LifecycleEvent) {
        let context = event.context_id();
        tracing::debug!(context = %context, event = event.kind(), "lifecycle event");
        match &event {
            LifecycleEvent::Inserted(id) | LifecycleEvent::Arrived(id) => {
                if let Err(err) = self.registry.start_coordinator(id) {
                    tracing::warn!(context = %id, error = %err, "coordinator start failed");
                }
            }
            LifecycleEvent::Removed(id) | LifecycleEvent::Departed(id) => {
                self.registry.stop_coordinator(id, event.kind());
            }
        }
    }
}

/// Handle events until every sender is dropped.
pub fn run_lifecycle_loop<C: Command>(lifecycle: &Lifecycle<C>, events: Receiver<LifecycleEvent>) {
    for event in events.iter() {
        lifecycle.handle(event);
    }
    tracing::debug!("lifecycle channel closed");
}
