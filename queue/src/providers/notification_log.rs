//! Notification log trait.
//!
//! Backs the at-most-once delivery guarantee: a `(ticket, kind)` pair is
//! delivered successfully at most once, no matter how many sweeps or
//! processes look at it.

use crate::error::Result;
use crate::types::{NotificationRecord, ReminderKind, TicketId};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by [`NotificationLog`] methods.
pub type LogFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Durable record of delivery attempts plus short-lived send claims.
pub trait NotificationLog: Send + Sync {
    /// Whether a successful delivery exists for the pair.
    fn has_sent(&self, ticket_id: TicketId, kind: ReminderKind) -> LogFuture<'_, bool>;

    /// Number of failed attempts recorded for the pair.
    fn failed_attempts(&self, ticket_id: TicketId, kind: ReminderKind) -> LogFuture<'_, u32>;

    /// Take the exclusive right to send the pair.
    ///
    /// Succeeds when no claim exists or the existing one was taken before
    /// `stale_before` (its holder is presumed dead). Returns `false` when
    /// someone else holds a live claim.
    fn try_claim(
        &self,
        ticket_id: TicketId,
        kind: ReminderKind,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> LogFuture<'_, bool>;

    /// Drop the pair's claim without recording an attempt.
    fn release_claim(&self, ticket_id: TicketId, kind: ReminderKind) -> LogFuture<'_, ()>;

    /// Append an attempt record and release the pair's claim.
    fn record(&self, record: NotificationRecord) -> LogFuture<'_, ()>;

    /// Every attempt for a ticket, oldest first.
    fn records_for(&self, ticket_id: TicketId) -> LogFuture<'_, Vec<NotificationRecord>>;
}
