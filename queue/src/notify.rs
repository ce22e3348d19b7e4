//! Customer notifications: message templates and guarded delivery.
//!
//! [`NotificationDispatcher::dispatch`] is the only way a message leaves the
//! engine. For each `(ticket, kind)` it:
//!
//! 1. skips tickets without a usable address,
//! 2. skips pairs that already have a `sent` record,
//! 3. gives up after the configured number of failed attempts,
//! 4. claims the pair, then re-checks for a `sent` record written by a
//!    sender that finished in the meantime,
//! 5. sends, then records the outcome (releasing the claim).
//!
//! A delivery failure is recorded and reported in the outcome; it is never
//! an error for the caller.

use crate::config::ReminderConfig;
use crate::error::Result;
use crate::providers::{MessageSender, NotificationLog};
use crate::types::{DeliveryOutcome, NotificationRecord, ReminderKind, Ticket, TicketId};
use chairline_core::environment::Clock;
use chairline_runtime::metrics::{REMINDERS_FAILED, REMINDERS_SENT, counter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What happened to one dispatch request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// Delivered and recorded
    Sent,
    /// Attempted, gateway failed; recorded for retry
    Failed,
    /// A previous attempt already succeeded
    AlreadySent,
    /// Another worker holds the send claim
    InFlight,
    /// Ticket has no reachable address
    NoContact,
    /// Failed too many times; no longer attempted
    GaveUp,
}

impl DispatchOutcome {
    /// Whether a message was handed to the gateway during this dispatch.
    #[must_use]
    pub const fn attempted(self) -> bool {
        matches!(self, Self::Sent | Self::Failed)
    }
}

/// Render the customer-facing text for `kind`.
#[must_use]
pub fn render_message(kind: ReminderKind, ticket: &Ticket) -> String {
    let name = ticket
        .contact
        .name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or("there");
    let number = &ticket.queue_number;
    let eta = ticket
        .estimated_start
        .map_or_else(|| "soon".to_string(), |start| start.format("%H:%M").to_string());

    match kind {
        ReminderKind::BookingConfirmed => format!(
            "Hi {name}, you're in the queue with number {number}. Estimated start: {eta}."
        ),
        ReminderKind::ThirtyMinutes => format!(
            "Hi {name}, your turn ({number}) is coming up in about 30 minutes, around {eta}."
        ),
        ReminderKind::FifteenMinutes => format!(
            "Hi {name}, your turn ({number}) is about 15 minutes away, around {eta}. Please head over."
        ),
        ReminderKind::NextInLine => {
            format!("Hi {name}, you're next in line ({number}). Please be ready.")
        },
        ReminderKind::YourTurn => format!("Hi {name}, it's your turn now ({number})."),
        ReminderKind::ThankYou => {
            format!("Thanks for visiting, {name}! We hope to see you again soon.")
        },
    }
}

/// Sends notifications at most once per `(ticket, kind)`.
#[derive(Clone)]
pub struct NotificationDispatcher {
    log: Arc<dyn NotificationLog>,
    sender: Arc<dyn MessageSender>,
    clock: Arc<dyn Clock>,
    config: ReminderConfig,
}

impl std::fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl NotificationDispatcher {
    /// Create a dispatcher.
    #[must_use]
    pub fn new(
        log: Arc<dyn NotificationLog>,
        sender: Arc<dyn MessageSender>,
        clock: Arc<dyn Clock>,
        config: ReminderConfig,
    ) -> Self {
        Self {
            log,
            sender,
            clock,
            config,
        }
    }

    /// Deliver `kind` for `ticket` unless it was already delivered.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the notification log fails. Gateway
    /// failures are not errors; they yield [`DispatchOutcome::Failed`].
    pub async fn dispatch(&self, ticket: &Ticket, kind: ReminderKind) -> Result<DispatchOutcome> {
        let Some(recipient) = ticket.contact_address() else {
            tracing::debug!(ticket_id = %ticket.id, %kind, "No contact address, skipping");
            return Ok(DispatchOutcome::NoContact);
        };

        if self.log.has_sent(ticket.id, kind).await? {
            return Ok(DispatchOutcome::AlreadySent);
        }

        let failures = self.log.failed_attempts(ticket.id, kind).await?;
        if failures >= self.config.max_delivery_attempts {
            tracing::debug!(ticket_id = %ticket.id, %kind, failures, "Delivery attempts exhausted");
            return Ok(DispatchOutcome::GaveUp);
        }

        let now = self.clock.now();
        let stale_before = now - self.config.claim_timeout();
        if !self.log.try_claim(ticket.id, kind, now, stale_before).await? {
            tracing::debug!(ticket_id = %ticket.id, %kind, "Send already claimed");
            return Ok(DispatchOutcome::InFlight);
        }

        // Another sender may have delivered and released its claim between
        // the first check and ours. Its `sent` record is written before the
        // release, so it is visible now.
        if self.log.has_sent(ticket.id, kind).await? {
            self.log.release_claim(ticket.id, kind).await?;
            tracing::debug!(ticket_id = %ticket.id, %kind, "Delivered by a concurrent sender");
            return Ok(DispatchOutcome::AlreadySent);
        }

        let body = render_message(kind, ticket);
        let result = self.sender.send(recipient, &body).await;

        let (outcome, error) = match result {
            Ok(()) => {
                counter!(REMINDERS_SENT, "kind" => kind.as_str()).increment(1);
                tracing::info!(ticket_id = %ticket.id, %kind, "Notification sent");
                (DeliveryOutcome::Sent, None)
            },
            Err(err) => {
                counter!(REMINDERS_FAILED, "kind" => kind.as_str()).increment(1);
                tracing::warn!(
                    ticket_id = %ticket.id,
                    %kind,
                    attempt = failures + 1,
                    error = %err,
                    "Notification delivery failed"
                );
                (DeliveryOutcome::Failed, Some(err.to_string()))
            },
        };

        self.log
            .record(NotificationRecord {
                ticket_id: ticket.id,
                kind,
                recipient: recipient.to_string(),
                body,
                outcome,
                error,
                recorded_at: self.clock.now(),
            })
            .await?;

        Ok(match outcome {
            DeliveryOutcome::Sent => DispatchOutcome::Sent,
            DeliveryOutcome::Failed => DispatchOutcome::Failed,
        })
    }

    /// Attempt history for a ticket.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the notification log fails.
    pub async fn records_for(&self, ticket_id: TicketId) -> Result<Vec<NotificationRecord>> {
        self.log.records_for(ticket_id).await
    }
}
