//! The set of ticket books one coordinator drains.
//!
//! `pending` and `priority` belong to the current issuer. `recovered` holds
//! backlogs of earlier issuers, kept sorted in service order and never empty.
//! Tickets issued but whose envelope is not yet persisted sit in `in_flight`;
//! a book is only visible up to its first in-flight ticket, so the batch loop
//! never overtakes a submission still being written.

use std::collections::BTreeSet;

use ordo_core::{IssuerId, Ticket, TicketBook, TicketBookError};

use crate::config::RecoveryInterleave;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum BookSource {
    /// The oldest recovered book.
    Recovered,
    Priority,
    Pending,
}

#[derive(Debug)]
pub(crate) struct TicketBooks {
    pending: TicketBook,
    priority: TicketBook,
    recovered: Vec<TicketBook>,
    in_flight: BTreeSet<Ticket>,
    interleave: RecoveryInterleave,
}

impl TicketBooks {
    pub(crate) fn new(issuer: IssuerId, interleave: RecoveryInterleave) -> Self {
        Self {
            pending: TicketBook::new(issuer.ordinary()),
            priority: TicketBook::new(issuer.priority()),
            recovered: Vec::new(),
            in_flight: BTreeSet::new(),
            interleave,
        }
    }

    pub(crate) fn issuer(&self) -> IssuerId {
        self.pending.issuer()
    }

    /// Hand out the next ticket of the requested class. It stays invisible to
    /// the batch loop until [`release`](Self::release).
    pub(crate) fn issue(&mut self, priority: bool) -> Ticket {
        let book = if priority {
            &mut self.priority
        } else {
            &mut self.pending
        };
        let ticket = book.extend();
        self.in_flight.insert(ticket);
        ticket
    }

    /// The ticket's envelope was persisted, or its persist failed for good.
    /// Either way the batch loop may now pass it.
    pub(crate) fn release(&mut self, ticket: &Ticket) {
        self.in_flight.remove(ticket);
    }

    /// Switch to a fresh issuer. Unfinished books of the old issuer join the
    /// recovered backlog.
    pub(crate) fn reissue(&mut self, issuer: IssuerId) {
        let old_pending = std::mem::replace(&mut self.pending, TicketBook::new(issuer.ordinary()));
        let old_priority =
            std::mem::replace(&mut self.priority, TicketBook::new(issuer.priority()));
        self.adopt(old_pending);
        self.adopt(old_priority);
    }

    /// Add a recovered book, merging with any book of the same issuer.
    pub(crate) fn adopt(&mut self, book: TicketBook) {
        if book.is_empty() {
            return;
        }
        match self
            .recovered
            .iter_mut()
            .find(|existing| existing.issuer() == book.issuer())
        {
            Some(existing) => {
                let from = existing.from().min(book.from());
                let to = existing.to().max(book.to());
                if let Ok(merged) = TicketBook::with_range(book.issuer(), from, to) {
                    *existing = merged;
                }
            }
            None => {
                self.recovered.push(book);
                self.recovered.sort();
            }
        }
    }

    fn book(&self, source: BookSource) -> Option<&TicketBook> {
        match source {
            BookSource::Recovered => self.recovered.first(),
            BookSource::Priority => Some(&self.priority),
            BookSource::Pending => Some(&self.pending),
        }
    }

    fn visible_len(&self, book: &TicketBook) -> u64 {
        let limit = self
            .in_flight
            .range(Ticket::new(book.issuer(), book.from())..)
            .next()
            .filter(|ticket| ticket.issuer() == book.issuer())
            .map(|ticket| ticket.sequence())
            .unwrap_or(book.to());
        limit.saturating_sub(book.from()).max(0) as u64
    }

    fn has_visible(&self, source: BookSource) -> bool {
        self.book(source)
            .is_some_and(|book| self.visible_len(book) > 0)
    }

    /// Which book the next batch drains, if any has visible work.
    pub(crate) fn select(&self) -> Option<BookSource> {
        let priority_ready = self.has_visible(BookSource::Priority);
        if let Some(recovered) = self.recovered.first() {
            let priority_first = self.interleave == RecoveryInterleave::PreferPriority
                && !recovered.is_priority();
            if priority_first && priority_ready {
                return Some(BookSource::Priority);
            }
            // An older backlog blocks newer work of its class.
            return self
                .has_visible(BookSource::Recovered)
                .then_some(BookSource::Recovered);
        }
        if priority_ready {
            return Some(BookSource::Priority);
        }
        self.has_visible(BookSource::Pending)
            .then_some(BookSource::Pending)
    }

    pub(crate) fn has_visible_work(&self) -> bool {
        self.select().is_some()
    }

    /// Up to `n` visible tickets from the front of `source`.
    pub(crate) fn peek(&self, source: BookSource, n: usize) -> Vec<Ticket> {
        let Some(book) = self.book(source) else {
            return Vec::new();
        };
        let visible = usize::try_from(self.visible_len(book)).unwrap_or(usize::MAX);
        book.first(n.min(visible)).collect()
    }

    pub(crate) fn consume(&mut self, source: BookSource, n: u64) -> Result<(), TicketBookError> {
        match source {
            BookSource::Recovered => {
                let Some(book) = self.recovered.first_mut() else {
                    return Ok(());
                };
                book.consume(n)?;
                if book.is_empty() {
                    self.recovered.remove(0);
                }
                Ok(())
            }
            BookSource::Priority => self.priority.consume(n),
            BookSource::Pending => self.pending.consume(n),
        }
    }

    pub(crate) fn issuers(&self) -> BTreeSet<IssuerId> {
        let mut issuers: BTreeSet<IssuerId> = self.recovered.iter().map(TicketBook::issuer).collect();
        issuers.insert(self.pending.issuer());
        issuers.insert(self.priority.issuer());
        issuers
    }

    pub(crate) fn pending_len(&self) -> u64 {
        self.pending.len()
    }

    pub(crate) fn priority_len(&self) -> u64 {
        self.priority.len()
    }

    pub(crate) fn recovered_len(&self) -> u64 {
        self.recovered.iter().map(TicketBook::len).sum()
    }

    pub(crate) fn recovered_books(&self) -> usize {
        self.recovered.len()
    }
}
