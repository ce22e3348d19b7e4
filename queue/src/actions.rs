//! Inputs to the queue reducer.

use crate::notify::DispatchOutcome;
use crate::status::TicketStatus;
use crate::types::{
    ActorContext, BookingChannel, Contact, CustomerId, QueueNumber, ReminderKind,
    ServiceOffering, TicketId,
};
use chrono::{DateTime, Utc};

/// Everything the shell resolved before asking the reducer to add a ticket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewTicket {
    /// Pre-generated ticket ID
    pub ticket_id: TicketId,
    /// Requested service, already loaded
    pub service: ServiceOffering,
    /// Registered customer, if any
    pub customer_id: Option<CustomerId>,
    /// How to reach the holder
    pub contact: Contact,
    /// Entry channel
    pub channel: BookingChannel,
    /// Time asked for (online bookings)
    pub requested_time: Option<DateTime<Utc>>,
    /// Allocated queue number
    pub queue_number: QueueNumber,
}

/// Queue actions.
///
/// Commands come from the service layer; `NotificationDispatched` is fed
/// back by notification effects after they ran.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueueAction {
    // ========== Commands ==========

    /// Append a ticket to the end of the queue
    CreateTicket {
        /// Caller
        actor: ActorContext,
        /// Resolved ticket data
        ticket: NewTicket,
    },

    /// Move a ticket along its lifecycle
    Transition {
        /// Caller
        actor: ActorContext,
        /// Target ticket
        ticket_id: TicketId,
        /// Requested status
        target: TicketStatus,
        /// Free-text note; stored as the cancellation reason on cancel
        note: Option<String>,
    },

    /// Refresh estimates without any status change
    Recalculate {
        /// Caller
        actor: ActorContext,
    },

    // ========== Effect feedback ==========

    /// A notification effect finished
    NotificationDispatched {
        /// Ticket the message was about
        ticket_id: TicketId,
        /// Message kind
        kind: ReminderKind,
        /// What happened (`None` if the notification log failed)
        outcome: Option<DispatchOutcome>,
    },
}

impl QueueAction {
    /// Shorthand for a transition command.
    #[must_use]
    pub const fn transition(
        actor: ActorContext,
        ticket_id: TicketId,
        target: TicketStatus,
        note: Option<String>,
    ) -> Self {
        Self::Transition {
            actor,
            ticket_id,
            target,
            note,
        }
    }
}
