//! Tickets and ticket books.
//!
//! A [`Ticket`] is an issuer-scoped sequence number. A [`TicketBook`] is the
//! contiguous run `[from, to)` of tickets one issuer has handed out and not yet
//! consumed. Books never hold gaps: anything that was issued and then vanished
//! (executed elsewhere, never persisted) stays inside the run and is skipped at
//! execution time.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TicketBookError;
use crate::identity::IssuerId;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ticket {
    issuer: IssuerId,
    sequence: i64,
}

impl Ticket {
    pub fn new(issuer: IssuerId, sequence: i64) -> Self {
        Self { issuer, sequence }
    }

    pub fn issuer(&self) -> IssuerId {
        self.issuer
    }

    pub fn sequence(&self) -> i64 {
        self.sequence
    }

    pub fn is_priority(&self) -> bool {
        self.issuer.is_priority()
    }

    pub fn is_provisional(&self) -> bool {
        self.issuer.is_provisional()
    }
}

impl Ord for Ticket {
    fn cmp(&self, other: &Self) -> Ordering {
        self.issuer
            .cmp(&other.issuer)
            .then(self.sequence.cmp(&other.sequence))
    }
}

impl PartialOrd for Ticket {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ticket({}#{})", self.issuer, self.sequence)
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.issuer, self.sequence)
    }
}

#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketBook {
    issuer: IssuerId,
    from: i64,
    to: i64,
}

impl TicketBook {
    /// An empty book whose first ticket will be sequence 0.
    pub fn new(issuer: IssuerId) -> Self {
        Self {
            issuer,
            from: 0,
            to: 0,
        }
    }

    pub fn with_range(issuer: IssuerId, from: i64, to: i64) -> Result<Self, TicketBookError> {
        if from > to {
            return Err(TicketBookError::InvertedRange { from, to });
        }
        Ok(Self { issuer, from, to })
    }

    /// Smallest book covering every given sequence, or `None` if there are none.
    ///
    /// Holes between the sequences end up inside the book.
    pub fn covering(issuer: IssuerId, sequences: impl IntoIterator<Item = i64>) -> Option<Self> {
        let mut bounds: Option<(i64, i64)> = None;
        for seq in sequences {
            bounds = Some(match bounds {
                None => (seq, seq),
                Some((lo, hi)) => (lo.min(seq), hi.max(seq)),
            });
        }
        bounds.map(|(lo, hi)| Self {
            issuer,
            from: lo,
            to: hi + 1,
        })
    }

    pub fn issuer(&self) -> IssuerId {
        self.issuer
    }

    pub fn from(&self) -> i64 {
        self.from
    }

    pub fn to(&self) -> i64 {
        self.to
    }

    pub fn is_empty(&self) -> bool {
        self.from == self.to
    }

    pub fn len(&self) -> u64 {
        self.to.abs_diff(self.from)
    }

    pub fn is_priority(&self) -> bool {
        self.issuer.is_priority()
    }

    /// Append the next ticket to the run and return it.
    pub fn extend(&mut self) -> Ticket {
        let ticket = Ticket::new(self.issuer, self.to);
        // One step per submission from zero; an i64 run is never exhausted.
        self.to = self.to.checked_add(1).expect("ticket sequence overflow");
        ticket
    }

    /// Drop the first `n` tickets.
    pub fn consume(&mut self, n: u64) -> Result<(), TicketBookError> {
        let available = self.len();
        if n > available {
            return Err(TicketBookError::ConsumeOverrun {
                issuer: self.issuer,
                requested: n,
                available,
            });
        }
        // n <= len <= i64::MAX - from, so this cannot wrap.
        self.from += n as i64;
        Ok(())
    }

    /// Up to `n` tickets from the front, without removing them.
    pub fn first(&self, n: usize) -> Tickets {
        let end = self
            .from
            .saturating_add(i64::try_from(n).unwrap_or(i64::MAX))
            .min(self.to);
        Tickets {
            issuer: self.issuer,
            next: self.from,
            end,
        }
    }

    pub fn front(&self) -> Option<Ticket> {
        (!self.is_empty()).then(|| Ticket::new(self.issuer, self.from))
    }

    pub fn contains(&self, ticket: &Ticket) -> bool {
        ticket.issuer() == self.issuer && (self.from..self.to).contains(&ticket.sequence())
    }
}

impl Ord for TicketBook {
    fn cmp(&self, other: &Self) -> Ordering {
        self.issuer
            .cmp(&other.issuer)
            .then(self.from.cmp(&other.from))
            .then(self.to.cmp(&other.to))
    }
}

impl PartialOrd for TicketBook {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for TicketBook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TicketBook({}: {}..{})", self.issuer, self.from, self.to)
    }
}

/// Read-only iterator over the front of a [`TicketBook`].
#[derive(Clone, Debug)]
pub struct Tickets {
    issuer: IssuerId,
    next: i64,
    end: i64,
}

impl Iterator for Tickets {
    type Item = Ticket;

    fn next(&mut self) -> Option<Ticket> {
        if self.next >= self.end {
            return None;
        }
        let ticket = Ticket::new(self.issuer, self.next);
        self.next += 1;
        Some(ticket)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.end.abs_diff(self.next)).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Tickets {}
