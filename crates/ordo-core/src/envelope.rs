//! Command envelopes: the persisted submission record of one command.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::identity::ContextId;
use crate::ticket::Ticket;

/// Where envelopes for a context are stored.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementStrategy {
    /// Partition-affine to the context record.
    #[default]
    Colocated,
    /// Partitioned independently of the context record.
    Distributed,
}

crate::enum_str! {
    impl PlacementStrategy {
        pub fn as_str(&self) -> &'static str;
        pub fn parse_str(raw: &str) -> Option<Self>;
        variants {
            Colocated => ["colocated", "co-located"],
            Distributed => ["distributed"],
        }
    }
}

impl PlacementStrategy {
    /// Placement implied by a ticket: provisional issuers always co-locate,
    /// configured issuers use the context's declared strategy.
    pub fn for_ticket(ticket: &Ticket, declared: PlacementStrategy) -> Self {
        if ticket.is_provisional() {
            PlacementStrategy::Colocated
        } else {
            declared
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeStatus {
    Pending,
    Started,
    Canceled,
    /// Only ever seen on dead-lettered envelopes.
    Failed,
}

crate::enum_str! {
    impl EnvelopeStatus {
        pub fn as_str(&self) -> &'static str;
        pub fn parse_str(raw: &str) -> Option<Self>;
        variants {
            Pending => ["pending"],
            Started => ["started"],
            Canceled => ["canceled", "cancelled"],
            Failed => ["failed"],
        }
    }
}

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EnvelopeKey {
    pub context: ContextId,
    pub ticket: Ticket,
}

impl EnvelopeKey {
    pub fn new(context: ContextId, ticket: Ticket) -> Self {
        Self { context, ticket }
    }
}

impl fmt::Debug for EnvelopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EnvelopeKey({}/{})", self.context, self.ticket)
    }
}

impl fmt::Display for EnvelopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.context, self.ticket)
    }
}

/// Opaque checkpoint bytes saved by a long-running command.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Checkpoint(Vec<u8>);

impl Checkpoint {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn encode<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_vec(value).map(Self)
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checkpoint({} bytes)", self.0.len())
    }
}

/// Result of moving an envelope towards execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartOutcome {
    /// Pending -> Started.
    Started,
    /// Already Started by an earlier owner; this run is a replay.
    Resumed,
    /// Canceled while pending; must not execute.
    Canceled,
    /// Dead-lettered; must not execute.
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    Canceled,
    AlreadyStarted,
    AlreadyCanceled,
    NotFound,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandEnvelope<C> {
    pub key: EnvelopeKey,
    pub command: C,
    pub queued_at_ms: u64,
    pub status: EnvelopeStatus,
    #[serde(default)]
    pub checkpoint: Option<Checkpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl<C> CommandEnvelope<C> {
    pub fn new(key: EnvelopeKey, command: C, queued_at_ms: u64) -> Self {
        Self {
            key,
            command,
            queued_at_ms,
            status: EnvelopeStatus::Pending,
            checkpoint: None,
            failure: None,
        }
    }

    pub fn ticket(&self) -> Ticket {
        self.key.ticket
    }

    pub fn start(&mut self) -> StartOutcome {
        match self.status {
            EnvelopeStatus::Pending => {
                self.status = EnvelopeStatus::Started;
                StartOutcome::Started
            }
            EnvelopeStatus::Started => StartOutcome::Resumed,
            EnvelopeStatus::Canceled => StartOutcome::Canceled,
            EnvelopeStatus::Failed => StartOutcome::Failed,
        }
    }

    /// Cancel a pending envelope. Started envelopes are left alone.
    pub fn cancel(&mut self) -> CancelOutcome {
        match self.status {
            EnvelopeStatus::Pending => {
                self.status = EnvelopeStatus::Canceled;
                CancelOutcome::Canceled
            }
            EnvelopeStatus::Started | EnvelopeStatus::Failed => CancelOutcome::AlreadyStarted,
            EnvelopeStatus::Canceled => CancelOutcome::AlreadyCanceled,
        }
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.status = EnvelopeStatus::Failed;
        self.failure = Some(reason.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IssuerId;

    fn envelope() -> CommandEnvelope<String> {
        let key = EnvelopeKey::new(
            ContextId::new("ctx").unwrap(),
            Ticket::new(IssuerId::configured(3), 0),
        );
        CommandEnvelope::new(key, "noop".to_string(), 1_700_000_000_000)
    }

    #[test]
    fn pending_starts_once_then_resumes() {
        let mut env = envelope();
        assert_eq!(env.start(), StartOutcome::Started);
        assert_eq!(env.status, EnvelopeStatus::Started);
        assert_eq!(env.start(), StartOutcome::Resumed);
    }

    #[test]
    fn cancel_only_wins_while_pending() {
        let mut env = envelope();
        assert_eq!(env.cancel(), CancelOutcome::Canceled);
        assert_eq!(env.cancel(), CancelOutcome::AlreadyCanceled);
        assert_eq!(env.start(), StartOutcome::Canceled);

        let mut env = envelope();
        env.start();
        assert_eq!(env.cancel(), CancelOutcome::AlreadyStarted);
        assert_eq!(env.status, EnvelopeStatus::Started);
    }

    #[test]
    fn provisional_tickets_always_colocate() {
        let provisional = Ticket::new(IssuerId::provisional(2), 0);
        let configured = Ticket::new(IssuerId::configured(2), 0);
        assert_eq!(
            PlacementStrategy::for_ticket(&provisional, PlacementStrategy::Distributed),
            PlacementStrategy::Colocated
        );
        assert_eq!(
            PlacementStrategy::for_ticket(&configured, PlacementStrategy::Distributed),
            PlacementStrategy::Distributed
        );
        assert_eq!(
            PlacementStrategy::for_ticket(
                &Ticket::new(IssuerId::configured(2).priority(), 0),
                PlacementStrategy::Distributed
            ),
            PlacementStrategy::Distributed
        );
    }

    #[test]
    fn checkpoint_round_trips_json() {
        let checkpoint = Checkpoint::encode(&(3u32, "half")).unwrap();
        let (step, label): (u32, String) = checkpoint.decode().unwrap();
        assert_eq!((step, label.as_str()), (3, "half"));
    }
}
