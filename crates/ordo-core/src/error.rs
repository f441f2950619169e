//! Core errors: identifier validation and ticket-book misuse.
//!
//! Everything here is a domain refusal. Nothing in this module performs I/O, so
//! none of these errors are retryable.

use thiserror::Error;

use crate::identity::IssuerId;

/// Whether retrying this operation may succeed.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Transience {
    /// Retrying cannot help without different inputs.
    Permanent,
    /// Contention or a moving partition; retrying may help.
    Retryable,
    /// No way to tell.
    Unknown,
}

impl Transience {
    pub fn is_retryable(self) -> bool {
        matches!(self, Transience::Retryable)
    }
}

/// What is known about side effects when an error is returned.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Effect {
    /// Nothing was written.
    None,
    /// Something was written.
    Some,
    /// A write may or may not have landed.
    Unknown,
}

crate::enum_str! {
    impl Effect {
        pub fn as_str(&self) -> &'static str;
        fn parse_str(raw: &str) -> Option<Self>;
        variants {
            None => ["none"],
            Some => ["some"],
            Unknown => ["unknown"],
        }
    }
}

/// Invalid identifier.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidId {
    #[error("context id `{raw}` is invalid: {reason}")]
    Context { raw: String, reason: String },
    #[error("node id `{raw}` is invalid: {reason}")]
    Node { raw: String, reason: String },
}

/// Misuse of a [`crate::TicketBook`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TicketBookError {
    #[error("cannot consume {requested} tickets from book {issuer}: only {available} remain")]
    ConsumeOverrun {
        issuer: IssuerId,
        requested: u64,
        available: u64,
    },
    #[error("ticket book range {from}..{to} is inverted")]
    InvertedRange { from: i64, to: i64 },
}

/// A commit carried a context version other than the record's current one.
///
/// The record was re-claimed since the committer loaded it, so the
/// committer no longer owns the context.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("context version moved: expected {expected}, found {actual}")]
pub struct VersionMismatch {
    pub expected: i64,
    pub actual: i64,
}

/// Canonical error enum for the core crate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CoreError {
    #[error(transparent)]
    InvalidId(#[from] InvalidId),
    #[error(transparent)]
    TicketBook(#[from] TicketBookError),
    #[error(transparent)]
    VersionMismatch(#[from] VersionMismatch),
}

impl CoreError {
    pub fn transience(&self) -> Transience {
        Transience::Permanent
    }

    pub fn effect(&self) -> Effect {
        Effect::None
    }
}
