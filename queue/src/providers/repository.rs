//! Ticket repository trait.

use crate::error::Result;
use crate::state::{QueueCommit, QueueSnapshot};
use crate::types::{Provider, ProviderId, ServiceId, ServiceOffering, TenantId, Ticket, TicketId};
use chrono::NaiveDate;

/// Durable store for providers, services and tickets.
///
/// # Consistency
///
/// [`commit`](Self::commit) must apply a whole [`QueueCommit`] or nothing.
/// Every version check failure, and every clash on the unique
/// `(provider, service_day, position)` key, must surface as
/// [`QueueError::ConcurrentModification`](crate::error::QueueError::ConcurrentModification)
/// so the caller can re-run the command.
pub trait TicketRepository: Send + Sync {
    /// Get a ticket by ID, whatever its status.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Storage`](crate::error::QueueError::Storage) if the
    /// backend fails.
    fn find_ticket(
        &self,
        ticket_id: TicketId,
    ) -> impl std::future::Future<Output = Result<Option<Ticket>>> + Send;

    /// Get a provider by ID.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the backend fails.
    fn find_provider(
        &self,
        provider_id: ProviderId,
    ) -> impl std::future::Future<Output = Result<Option<Provider>>> + Send;

    /// Get a service offering by ID.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the backend fails.
    fn find_service(
        &self,
        service_id: ServiceId,
    ) -> impl std::future::Future<Output = Result<Option<ServiceOffering>>> + Send;

    /// Load a provider's active tickets for one day, in position order.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the provider does not exist, or a storage error.
    fn load_queue(
        &self,
        provider_id: ProviderId,
        service_day: NaiveDate,
    ) -> impl std::future::Future<Output = Result<QueueSnapshot>> + Send;

    /// Atomically allocate the next queue-number sequence for a tenant and day.
    ///
    /// Sequences start at 1 and are never handed out twice, even if the
    /// command that took one later fails.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the backend fails.
    fn next_queue_number(
        &self,
        tenant_id: TenantId,
        service_day: NaiveDate,
    ) -> impl std::future::Future<Output = Result<u32>> + Send;

    /// Apply one command's changes atomically.
    ///
    /// Returns the committed tickets (inserted, then updated).
    ///
    /// # Errors
    ///
    /// Returns `ConcurrentModification` on any version or position conflict,
    /// or a storage error.
    fn commit(
        &self,
        commit: QueueCommit,
    ) -> impl std::future::Future<Output = Result<Vec<Ticket>>> + Send;

    /// Active tickets of every tenant for the given days, ordered by
    /// provider, day and position.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the backend fails.
    fn active_tickets(
        &self,
        service_days: &[NaiveDate],
    ) -> impl std::future::Future<Output = Result<Vec<Ticket>>> + Send;
}
