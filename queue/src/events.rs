//! Domain events fanned out to live views after a commit.
//!
//! Every ticket event carries the full post-change ticket so subscribers
//! never need a read-back. Delivery is best effort: a failed publication is
//! logged and the command still succeeds.

use crate::error::EventSinkError;
use crate::providers::EventSink;
use crate::types::{Provider, ProviderId, ProviderStatus, TenantId, Ticket};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use tokio::sync::broadcast;

/// Facts published after a queue commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TicketEvent {
    /// A ticket joined a queue
    TicketCreated {
        /// Ticket after creation
        ticket: Ticket,
    },
    /// A ticket's status or estimate changed
    TicketUpdated {
        /// Ticket after the change
        ticket: Ticket,
    },
    /// A ticket was canceled
    TicketCancelled {
        /// Ticket after cancellation
        ticket: Ticket,
    },
    /// A provider's availability changed
    ProviderStatusChanged {
        /// Provider
        provider_id: ProviderId,
        /// Owning tenant
        tenant_id: TenantId,
        /// New status
        status: ProviderStatus,
    },
}

impl TicketEvent {
    /// Event for a provider's new status.
    #[must_use]
    pub const fn provider_status(provider: &Provider) -> Self {
        Self::ProviderStatusChanged {
            provider_id: provider.id,
            tenant_id: provider.tenant_id,
            status: provider.status,
        }
    }

    /// Versioned event name, used as a routing key.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::TicketCreated { .. } => "TicketCreated.v1",
            Self::TicketUpdated { .. } => "TicketUpdated.v1",
            Self::TicketCancelled { .. } => "TicketCancelled.v1",
            Self::ProviderStatusChanged { .. } => "ProviderStatusChanged.v1",
        }
    }

    /// Tenant the event belongs to; subscribers filter on it.
    #[must_use]
    pub const fn tenant_id(&self) -> TenantId {
        match self {
            Self::TicketCreated { ticket }
            | Self::TicketUpdated { ticket }
            | Self::TicketCancelled { ticket } => ticket.tenant_id,
            Self::ProviderStatusChanged { tenant_id, .. } => *tenant_id,
        }
    }

    /// The ticket carried by the event, if any.
    #[must_use]
    pub const fn ticket(&self) -> Option<&Ticket> {
        match self {
            Self::TicketCreated { ticket }
            | Self::TicketUpdated { ticket }
            | Self::TicketCancelled { ticket } => Some(ticket),
            Self::ProviderStatusChanged { .. } => None,
        }
    }
}

/// In-process fan-out over a tokio broadcast channel.
///
/// Slow subscribers lag and drop old events; publishing never blocks.
#[derive(Debug, Clone)]
pub struct BroadcastEventSink {
    sender: broadcast::Sender<TicketEvent>,
}

impl BroadcastEventSink {
    /// Create a sink buffering up to `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TicketEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastEventSink {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl EventSink for BroadcastEventSink {
    fn publish(
        &self,
        event: TicketEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventSinkError>> + Send + '_>> {
        Box::pin(async move {
            let event_type = event.event_type();
            match self.sender.send(event) {
                Ok(receivers) => {
                    tracing::trace!(event_type, receivers, "Event broadcast");
                },
                Err(_) => {
                    tracing::trace!(event_type, "No subscribers for event");
                },
            }
            Ok(())
        })
    }
}
