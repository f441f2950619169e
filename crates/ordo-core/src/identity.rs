//! Identity atoms.
//!
//! ContextId: name of a partitioned, stateful context
//! NodeId: cluster member that may own contexts
//! IssuerId: ticket issuer, with class and provisional-ness encoded in the value

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, InvalidId};

/// Context identifier: non-empty, no surrounding whitespace, no control characters.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContextId(String);

impl ContextId {
    pub fn new(s: impl Into<String>) -> Result<Self, CoreError> {
        let s = s.into();
        let reason = if s.trim().is_empty() {
            Some("empty")
        } else if s.trim() != s {
            Some("surrounding whitespace")
        } else if s.chars().any(char::is_control) {
            Some("control character")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(InvalidId::Context {
                raw: s,
                reason: reason.into(),
            }
            .into()),
            None => Ok(Self(s)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContextId({:?})", self.0)
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ContextId {
    type Error = CoreError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        ContextId::new(s)
    }
}

impl From<ContextId> for String {
    fn from(id: ContextId) -> String {
        id.0
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Uuid);

impl NodeId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse_str(s: &str) -> Result<Self, CoreError> {
        Uuid::parse_str(s).map(Self).map_err(|e| {
            InvalidId::Node {
                raw: s.to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for NodeId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Ticket issuer.
///
/// Issuers are derived from a cluster-wide generation counter `g >= 1`:
/// a configured issuer is `2g`, a provisional (pre-configuration) issuer is
/// `2g + 1`, and the priority twin of issuer `i` is `-i`. The sign therefore
/// gives the class and the parity of the magnitude tells provisional from
/// configured, both in O(1) from a bare ticket.
///
/// Ordering puts every priority issuer before every ordinary issuer and, within
/// a class, older (smaller magnitude) issuers first. That is the order in
/// which recovered backlogs are drained.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IssuerId(i64);

impl IssuerId {
    pub fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    /// # Panics
    ///
    /// If `generation > i64::MAX / 2`. Generations grow by one per
    /// coordinator start and never get there.
    pub fn configured(generation: i64) -> Self {
        Self(
            generation
                .checked_mul(2)
                .expect("issuer generation overflow"),
        )
    }

    /// # Panics
    ///
    /// Same bound as [`IssuerId::configured`].
    pub fn provisional(generation: i64) -> Self {
        Self(
            generation
                .checked_mul(2)
                .and_then(|v| v.checked_add(1))
                .expect("issuer generation overflow"),
        )
    }

    pub fn get(self) -> i64 {
        self.0
    }

    pub fn magnitude(self) -> u64 {
        self.0.unsigned_abs()
    }

    pub fn is_priority(self) -> bool {
        self.0 < 0
    }

    pub fn is_provisional(self) -> bool {
        self.magnitude() % 2 == 1
    }

    /// The priority-class twin of this issuer.
    pub fn priority(self) -> Self {
        Self(-self.0.abs())
    }

    /// The ordinary-class twin of this issuer.
    pub fn ordinary(self) -> Self {
        Self(self.0.abs())
    }
}

impl Ord for IssuerId {
    fn cmp(&self, other: &Self) -> Ordering {
        (!self.is_priority(), self.magnitude()).cmp(&(!other.is_priority(), other.magnitude()))
    }
}

impl PartialOrd for IssuerId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for IssuerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IssuerId({})", self.0)
    }
}

impl fmt::Display for IssuerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
