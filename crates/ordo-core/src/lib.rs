//! Core data model for ordo.
//!
//! Module hierarchy follows type dependency order:
//! - error: Transience/Effect classification, core errors
//! - identity: ContextId, NodeId, IssuerId
//! - ticket: Ticket, TicketBook
//! - envelope: CommandEnvelope, EnvelopeKey, PlacementStrategy
//! - record: ContextRecord, ExecutionMarks, commit protocol

#![forbid(unsafe_code)]

// Re-export enum_str! macro from ordo-macros for internal use and downstream consumers
pub use ordo_macros::enum_str;

pub mod envelope;
pub mod error;
pub mod identity;
pub mod record;
pub mod ticket;

pub use envelope::{
    CancelOutcome, Checkpoint, CommandEnvelope, EnvelopeKey, EnvelopeStatus, PlacementStrategy,
    StartOutcome,
};
pub use error::{CoreError, Effect, InvalidId, TicketBookError, Transience, VersionMismatch};
pub use identity::{ContextId, IssuerId, NodeId};
pub use record::{
    CommitOutcome, CommitOutcomeKind, CommitRequest, ContextConfig, ContextRecord,
    ExecutionCounters, ExecutionMark, ExecutionMarks,
};
pub use ticket::{Ticket, TicketBook, Tickets};
