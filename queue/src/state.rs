//! Reducer state: one provider's queue for one service-day.
//!
//! A command loads a [`QueueSnapshot`], wraps it in a [`ProviderQueue`],
//! lets the reducer mutate it, and drains the staged changes into a
//! [`QueueCommit`] that the repository applies atomically.
//!
//! Versions are bumped at most once per command, the first time a row is
//! staged, so a commit carries the *new* version of every row and the store
//! checks the stored version equals `new - 1`.

use crate::error::QueueError;
use crate::types::{HistoryEntry, Provider, Ticket, TicketId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Persisted view of a provider's queue, as loaded by the repository.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    /// The provider row (its version guards the whole queue)
    pub provider: Provider,
    /// Service-day
    pub service_day: NaiveDate,
    /// Active tickets ordered by position
    pub tickets: Vec<Ticket>,
    /// Highest position ever assigned for this provider and day, terminal
    /// tickets included (0 when none)
    pub last_position: u32,
}

/// Atomic unit of work produced by one command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueCommit {
    /// Provider row with its new version; the store requires the stored
    /// version to be `provider.version - 1`
    pub provider: Provider,
    /// Service-day the commit applies to
    pub service_day: NaiveDate,
    /// New tickets (version 1)
    pub inserted: Vec<Ticket>,
    /// Changed tickets with their new versions
    pub updated: Vec<Ticket>,
    /// History rows to append
    pub history: Vec<HistoryEntry>,
}

impl QueueCommit {
    /// Version the provider row must currently have.
    #[must_use]
    pub const fn expected_provider_version(&self) -> i64 {
        self.provider.version - 1
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct PendingChanges {
    inserted: BTreeSet<TicketId>,
    updated: BTreeSet<TicketId>,
    history: Vec<HistoryEntry>,
    provider_staged: bool,
}

/// Queue state the reducer works on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderQueue {
    /// Provider serving this queue
    pub provider: Provider,
    /// Service-day
    pub service_day: NaiveDate,
    /// Tickets in position order; active ones plus any terminal ticket a
    /// command addressed
    pub tickets: Vec<Ticket>,
    /// Highest position assigned so far
    pub last_position: u32,
    /// Error from the last rejected action, if any
    pub last_error: Option<QueueError>,
    pending: PendingChanges,
}

impl ProviderQueue {
    /// Wrap a freshly loaded snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: QueueSnapshot) -> Self {
        let mut tickets = snapshot.tickets;
        tickets.sort_by_key(|t| t.position);
        Self {
            provider: snapshot.provider,
            service_day: snapshot.service_day,
            tickets,
            last_position: snapshot.last_position,
            last_error: None,
            pending: PendingChanges::default(),
        }
    }

    /// Make sure `ticket` is part of the state.
    ///
    /// Snapshots only carry active tickets; a command addressing a terminal
    /// ticket adds it here so the reducer can reject it as an invalid
    /// transition rather than an unknown ticket.
    pub fn include(&mut self, ticket: Ticket) {
        if self.ticket(ticket.id).is_none() {
            let index = self
                .tickets
                .partition_point(|t| t.position < ticket.position);
            self.tickets.insert(index, ticket);
        }
    }

    /// Look up a ticket.
    #[must_use]
    pub fn ticket(&self, id: TicketId) -> Option<&Ticket> {
        self.tickets.iter().find(|t| t.id == id)
    }

    pub(crate) fn ticket_mut(&mut self, id: TicketId) -> Option<&mut Ticket> {
        self.tickets.iter_mut().find(|t| t.id == id)
    }

    /// The ticket currently in service, if any.
    #[must_use]
    pub fn in_service(&self) -> Option<&Ticket> {
        self.tickets
            .iter()
            .find(|t| t.status == crate::status::TicketStatus::InService)
    }

    /// Waiting tickets in position order.
    pub fn waiting(&self) -> impl Iterator<Item = &Ticket> {
        self.tickets.iter().filter(|t| t.is_waiting())
    }

    /// Active tickets in position order.
    #[must_use]
    pub fn active_tickets(&self) -> Vec<Ticket> {
        self.tickets.iter().filter(|t| t.is_active()).cloned().collect()
    }

    /// Position the next ticket gets.
    #[must_use]
    pub const fn next_position(&self) -> u32 {
        self.last_position + 1
    }

    /// Whether the current command has staged anything.
    #[must_use]
    pub fn has_pending_changes(&self) -> bool {
        self.pending.provider_staged
    }

    /// Stage a new ticket.
    pub(crate) fn insert(&mut self, ticket: Ticket) {
        self.last_position = self.last_position.max(ticket.position);
        self.pending.inserted.insert(ticket.id);
        self.include(ticket);
        self.stage_provider();
    }

    /// Stage a change to an existing ticket, bumping its version once.
    pub(crate) fn stage_update(&mut self, id: TicketId) {
        let first_change = !self.pending.inserted.contains(&id) && self.pending.updated.insert(id);
        if first_change {
            if let Some(ticket) = self.ticket_mut(id) {
                ticket.version += 1;
            }
        }
        self.stage_provider();
    }

    /// Stage a history row.
    pub(crate) fn record(&mut self, entry: HistoryEntry) {
        self.pending.history.push(entry);
        self.stage_provider();
    }

    fn stage_provider(&mut self) {
        if !self.pending.provider_staged {
            self.pending.provider_staged = true;
            self.provider.version += 1;
        }
    }

    /// Drain staged changes into a unit of work.
    ///
    /// Returns `None` when nothing was staged.
    pub fn take_commit(&mut self) -> Option<QueueCommit> {
        if !self.pending.provider_staged {
            return None;
        }
        let pending = std::mem::take(&mut self.pending);

        let pick = |ids: &BTreeSet<TicketId>| -> Vec<Ticket> {
            self.tickets
                .iter()
                .filter(|t| ids.contains(&t.id))
                .cloned()
                .collect()
        };

        Some(QueueCommit {
            provider: self.provider.clone(),
            service_day: self.service_day,
            inserted: pick(&pending.inserted),
            updated: pick(&pending.updated),
            history: pending.history,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;
    use crate::status::TicketStatus;
    use crate::types::{
        ActorContext, BookingChannel, Contact, QueueNumber, ServiceId, TenantId,
    };
    use chrono::Utc;

    fn queue_with(positions: &[u32]) -> ProviderQueue {
        let tenant = TenantId::new();
        let provider = Provider::new(tenant, "Rosa");
        let now = Utc::now();
        let tickets = positions
            .iter()
            .map(|&position| Ticket {
                id: TicketId::new(),
                tenant_id: tenant,
                provider_id: provider.id,
                service_id: ServiceId::new(),
                customer_id: None,
                contact: Contact::default(),
                channel: BookingChannel::WalkIn,
                status: TicketStatus::CheckedIn,
                queue_number: QueueNumber::new("A", position),
                service_day: now.date_naive(),
                position,
                estimated_duration_minutes: 30,
                requested_time: None,
                estimated_start: None,
                estimated_end: None,
                actual_start: None,
                actual_end: None,
                cancellation_reason: None,
                version: 3,
                created_at: now,
                updated_at: now,
            })
            .collect();
        ProviderQueue::from_snapshot(QueueSnapshot {
            provider,
            service_day: now.date_naive(),
            tickets,
            last_position: positions.iter().copied().max().unwrap_or(0),
        })
    }

    #[test]
    fn nothing_staged_means_no_commit() {
        let mut queue = queue_with(&[1, 2]);
        assert!(!queue.has_pending_changes());
        assert!(queue.take_commit().is_none());
    }

    #[test]
    fn versions_bump_once_per_command() {
        let mut queue = queue_with(&[1, 2]);
        let id = queue.tickets[0].id;

        queue.stage_update(id);
        queue.stage_update(id);

        let commit = queue.take_commit().unwrap();
        assert_eq!(commit.updated.len(), 1);
        assert_eq!(commit.updated[0].version, 4);
        assert_eq!(commit.provider.version, 2);
        assert_eq!(commit.expected_provider_version(), 1);
        assert!(queue.take_commit().is_none());
    }

    #[test]
    fn inserted_tickets_keep_version_one() {
        let mut queue = queue_with(&[1]);
        let mut ticket = queue.tickets[0].clone();
        ticket.id = TicketId::new();
        ticket.position = queue.next_position();
        ticket.version = 1;
        let id = ticket.id;

        queue.insert(ticket);
        queue.stage_update(id);
        queue.record(HistoryEntry {
            ticket_id: id,
            status: TicketStatus::CheckedIn,
            actor: ActorContext::system(queue.provider.tenant_id).reference(),
            note: None,
            recorded_at: Utc::now(),
        });

        let commit = queue.take_commit().unwrap();
        assert_eq!(commit.inserted.len(), 1);
        assert_eq!(commit.inserted[0].version, 1);
        assert!(commit.updated.is_empty());
        assert_eq!(commit.history.len(), 1);
        assert_eq!(queue.last_position, 2);
    }

    #[test]
    fn included_tickets_keep_position_order() {
        let mut queue = queue_with(&[1, 3]);
        let mut terminal = queue.tickets[0].clone();
        terminal.id = TicketId::new();
        terminal.position = 2;
        terminal.status = TicketStatus::Done;

        queue.include(terminal.clone());
        queue.include(terminal);

        let positions: Vec<_> = queue.tickets.iter().map(|t| t.position).collect();
        assert_eq!(positions, vec![1, 2, 3]);
        assert_eq!(queue.active_tickets().len(), 2);
    }
}
