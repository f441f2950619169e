//! Ordered, recoverable command execution against partitioned contexts.
//!
//! A [`Registry`] keeps one [`Coordinator`](coordinator::Coordinator) per
//! context owned by this node. Submissions get a ticket, are persisted as
//! envelopes and run in ticket order on the coordinator's lane; results are
//! committed against the context record under its ownership version.

#![forbid(unsafe_code)]

// Re-export enum_str! macro for internal use and downstream consumers
pub use ordo_core::enum_str;

pub use ordo_core as core;

pub mod clock;
mod codec;
pub mod command;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod lane;
pub mod lifecycle;
pub mod metrics;
pub mod oracle;
pub mod paths;
pub mod registry;
pub mod sequence;
pub mod store;
pub mod telemetry;
pub mod test_utils;

pub use command::{CheckpointStore, Command, CommandError, Environment};
pub use coordinator::{AcceptOutcome, CoordinatorState, CoordinatorStats};
pub use error::{Error, Result};
pub use lifecycle::{Lifecycle, LifecycleEvent, run_lifecycle_loop};
pub use oracle::{Ownership, OwnershipOracle, OwnershipTable};
pub use registry::{CreateOutcome, Registry, SubmitOptions};
pub use sequence::{AtomicSequence, SequenceGenerator, StoreSequence};
pub use store::{KeySpace, MemoryStore, PartitionedStore, StoreError, StoreKey};
