//! In-memory store for tickets, history and notifications.

use crate::error::{QueueError, Result};
use crate::providers::notification_log::LogFuture;
use crate::providers::{HistoryLog, NotificationLog, TicketRepository};
use crate::state::{QueueCommit, QueueSnapshot};
use crate::types::{
    DeliveryOutcome, HistoryEntry, NotificationRecord, Provider, ProviderId, ReminderKind,
    ServiceId, ServiceOffering, TenantId, Ticket, TicketId,
};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Tables {
    providers: HashMap<ProviderId, Provider>,
    services: HashMap<ServiceId, ServiceOffering>,
    tickets: HashMap<TicketId, Ticket>,
    history: Vec<HistoryEntry>,
    counters: HashMap<(TenantId, NaiveDate), u32>,
    notifications: Vec<NotificationRecord>,
    claims: HashMap<(TicketId, ReminderKind), DateTime<Utc>>,
    injected_conflicts: u32,
    commits: u64,
}

/// Shared in-memory store. Clones see the same data.
#[derive(Debug, Clone, Default)]
pub struct InMemoryQueueStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryQueueStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| QueueError::Storage("in-memory store lock poisoned".into()))
    }

    /// Register a provider.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the store lock is poisoned.
    pub fn add_provider(&self, provider: Provider) -> Result<()> {
        self.lock()?.providers.insert(provider.id, provider);
        Ok(())
    }

    /// Register a service offering.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the store lock is poisoned.
    pub fn add_service(&self, service: ServiceOffering) -> Result<()> {
        self.lock()?.services.insert(service.id, service);
        Ok(())
    }

    /// Overwrite a provider row directly (simulates an outside status change).
    ///
    /// # Errors
    ///
    /// Returns a storage error if the store lock is poisoned.
    pub fn put_provider(&self, provider: Provider) -> Result<()> {
        self.add_provider(provider)
    }

    /// Make the next `count` commits fail with a conflict.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the store lock is poisoned.
    pub fn inject_conflicts(&self, count: u32) -> Result<()> {
        self.lock()?.injected_conflicts = count;
        Ok(())
    }

    /// A ticket by ID.
    #[must_use]
    pub fn ticket(&self, ticket_id: TicketId) -> Option<Ticket> {
        self.lock().ok()?.tickets.get(&ticket_id).cloned()
    }

    /// A provider by ID.
    #[must_use]
    pub fn provider(&self, provider_id: ProviderId) -> Option<Provider> {
        self.lock().ok()?.providers.get(&provider_id).cloned()
    }

    /// Every ticket, ordered by provider, day and position.
    #[must_use]
    pub fn all_tickets(&self) -> Vec<Ticket> {
        let mut tickets: Vec<Ticket> = self
            .lock()
            .map(|t| t.tickets.values().cloned().collect())
            .unwrap_or_default();
        tickets.sort_by_key(|t| (t.provider_id, t.service_day, t.position));
        tickets
    }

    /// Every notification record, oldest first.
    #[must_use]
    pub fn notification_records(&self) -> Vec<NotificationRecord> {
        self.lock()
            .map(|t| t.notifications.clone())
            .unwrap_or_default()
    }

    /// Number of successful commits.
    #[must_use]
    pub fn commit_count(&self) -> u64 {
        self.lock().map(|t| t.commits).unwrap_or_default()
    }
}

fn check_commit(tables: &Tables, commit: &QueueCommit) -> Result<()> {
    let provider_id = commit.provider.id;
    let stored = tables
        .providers
        .get(&provider_id)
        .ok_or_else(|| QueueError::not_found("provider", provider_id))?;
    if stored.version != commit.expected_provider_version() {
        return Err(QueueError::conflict("provider", provider_id));
    }

    for ticket in &commit.updated {
        let stored = tables
            .tickets
            .get(&ticket.id)
            .ok_or_else(|| QueueError::not_found("ticket", ticket.id))?;
        if stored.version != ticket.version - 1 {
            return Err(QueueError::conflict("ticket", ticket.id));
        }
    }

    for ticket in &commit.inserted {
        let position_taken = tables.tickets.values().any(|t| {
            t.provider_id == ticket.provider_id
                && t.service_day == ticket.service_day
                && t.position == ticket.position
        });
        if position_taken || tables.tickets.contains_key(&ticket.id) {
            return Err(QueueError::conflict("ticket", ticket.id));
        }
    }

    Ok(())
}

impl TicketRepository for InMemoryQueueStore {
    fn find_ticket(&self, ticket_id: TicketId) -> impl Future<Output = Result<Option<Ticket>>> + Send {
        async move { Ok(self.lock()?.tickets.get(&ticket_id).cloned()) }
    }

    fn find_provider(
        &self,
        provider_id: ProviderId,
    ) -> impl Future<Output = Result<Option<Provider>>> + Send {
        async move { Ok(self.lock()?.providers.get(&provider_id).cloned()) }
    }

    fn find_service(
        &self,
        service_id: ServiceId,
    ) -> impl Future<Output = Result<Option<ServiceOffering>>> + Send {
        async move { Ok(self.lock()?.services.get(&service_id).cloned()) }
    }

    fn load_queue(
        &self,
        provider_id: ProviderId,
        service_day: NaiveDate,
    ) -> impl Future<Output = Result<QueueSnapshot>> + Send {
        async move {
            let tables = self.lock()?;
            let provider = tables
                .providers
                .get(&provider_id)
                .cloned()
                .ok_or_else(|| QueueError::not_found("provider", provider_id))?;

            let day_tickets = tables
                .tickets
                .values()
                .filter(|t| t.provider_id == provider_id && t.service_day == service_day);
            let last_position = day_tickets.clone().map(|t| t.position).max().unwrap_or(0);
            let mut tickets: Vec<Ticket> = day_tickets.filter(|t| t.is_active()).cloned().collect();
            tickets.sort_by_key(|t| t.position);

            Ok(QueueSnapshot {
                provider,
                service_day,
                tickets,
                last_position,
            })
        }
    }

    fn next_queue_number(
        &self,
        tenant_id: TenantId,
        service_day: NaiveDate,
    ) -> impl Future<Output = Result<u32>> + Send {
        async move {
            let mut tables = self.lock()?;
            let counter = tables.counters.entry((tenant_id, service_day)).or_insert(0);
            *counter += 1;
            Ok(*counter)
        }
    }

    fn commit(&self, commit: QueueCommit) -> impl Future<Output = Result<Vec<Ticket>>> + Send {
        async move {
            let mut tables = self.lock()?;

            if tables.injected_conflicts > 0 {
                tables.injected_conflicts -= 1;
                return Err(QueueError::conflict("provider", commit.provider.id));
            }
            check_commit(&tables, &commit)?;

            tables.providers.insert(commit.provider.id, commit.provider);
            let mut committed = Vec::with_capacity(commit.inserted.len() + commit.updated.len());
            for ticket in commit.inserted.into_iter().chain(commit.updated) {
                tables.tickets.insert(ticket.id, ticket.clone());
                committed.push(ticket);
            }
            tables.history.extend(commit.history);
            tables.commits += 1;

            Ok(committed)
        }
    }

    fn active_tickets(
        &self,
        service_days: &[NaiveDate],
    ) -> impl Future<Output = Result<Vec<Ticket>>> + Send {
        let service_days = service_days.to_vec();
        async move {
            let mut tickets: Vec<Ticket> = self
                .lock()?
                .tickets
                .values()
                .filter(|t| t.is_active() && service_days.contains(&t.service_day))
                .cloned()
                .collect();
            tickets.sort_by_key(|t| (t.provider_id, t.service_day, t.position));
            Ok(tickets)
        }
    }
}

impl HistoryLog for InMemoryQueueStore {
    fn entries_for(&self, ticket_id: TicketId) -> impl Future<Output = Result<Vec<HistoryEntry>>> + Send {
        async move {
            Ok(self
                .lock()?
                .history
                .iter()
                .filter(|entry| entry.ticket_id == ticket_id)
                .cloned()
                .collect())
        }
    }
}

impl NotificationLog for InMemoryQueueStore {
    fn has_sent(&self, ticket_id: TicketId, kind: ReminderKind) -> LogFuture<'_, bool> {
        Box::pin(async move {
            Ok(self.lock()?.notifications.iter().any(|r| {
                r.ticket_id == ticket_id && r.kind == kind && r.outcome == DeliveryOutcome::Sent
            }))
        })
    }

    fn failed_attempts(&self, ticket_id: TicketId, kind: ReminderKind) -> LogFuture<'_, u32> {
        Box::pin(async move {
            let failures = self
                .lock()?
                .notifications
                .iter()
                .filter(|r| {
                    r.ticket_id == ticket_id
                        && r.kind == kind
                        && r.outcome == DeliveryOutcome::Failed
                })
                .count();
            Ok(u32::try_from(failures).unwrap_or(u32::MAX))
        })
    }

    fn try_claim(
        &self,
        ticket_id: TicketId,
        kind: ReminderKind,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> LogFuture<'_, bool> {
        Box::pin(async move {
            let mut tables = self.lock()?;
            let held = matches!(
                tables.claims.get(&(ticket_id, kind)),
                Some(claimed_at) if *claimed_at >= stale_before
            );
            if held {
                return Ok(false);
            }
            tables.claims.insert((ticket_id, kind), now);
            Ok(true)
        })
    }

    fn release_claim(&self, ticket_id: TicketId, kind: ReminderKind) -> LogFuture<'_, ()> {
        Box::pin(async move {
            self.lock()?.claims.remove(&(ticket_id, kind));
            Ok(())
        })
    }

    fn record(&self, record: NotificationRecord) -> LogFuture<'_, ()> {
        Box::pin(async move {
            let mut tables = self.lock()?;
            let duplicate_success = record.outcome == DeliveryOutcome::Sent
                && tables.notifications.iter().any(|r| {
                    r.ticket_id == record.ticket_id
                        && r.kind == record.kind
                        && r.outcome == DeliveryOutcome::Sent
                });
            tables.claims.remove(&(record.ticket_id, record.kind));
            if duplicate_success {
                return Err(QueueError::conflict("notification", record.ticket_id));
            }
            tables.notifications.push(record);
            Ok(())
        })
    }

    fn records_for(&self, ticket_id: TicketId) -> LogFuture<'_, Vec<NotificationRecord>> {
        Box::pin(async move {
            Ok(self
                .lock()?
                .notifications
                .iter()
                .filter(|r| r.ticket_id == ticket_id)
                .cloned()
                .collect())
        })
    }
}
