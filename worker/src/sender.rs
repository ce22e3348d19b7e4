//! Outbound adapters for the worker process.

use chairline_queue::providers::MessageSender;
use chairline_queue::{BroadcastEventSink, DeliveryError, TicketEvent};
use std::future::Future;
use std::pin::Pin;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;

/// Message sender that writes every message to the log instead of a
/// gateway. Stands in until an SMS or chat provider is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingMessageSender;

impl MessageSender for LoggingMessageSender {
    fn send<'a>(
        &'a self,
        recipient: &'a str,
        body: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), DeliveryError>> + Send + 'a>> {
        Box::pin(async move {
            tracing::info!(target: "chairline::outbox", recipient, body, "Message delivered");
            Ok(())
        })
    }
}

/// Log every published ticket event until `shutdown` turns `true`.
pub async fn log_events(events: BroadcastEventSink, mut shutdown: watch::Receiver<bool>) {
    let mut receiver = events.subscribe();
    loop {
        tokio::select! {
            received = receiver.recv() => match received {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event logger lagged behind");
                },
                Err(RecvError::Closed) => break,
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

fn log_event(event: &TicketEvent) {
    match event.ticket() {
        Some(ticket) => tracing::debug!(
            event_type = event.event_type(),
            tenant_id = %ticket.tenant_id,
            ticket_id = %ticket.id,
            status = %ticket.status,
            queue_number = %ticket.queue_number,
            "Ticket event"
        ),
        None => tracing::debug!(
            event_type = event.event_type(),
            tenant_id = %event.tenant_id(),
            "Provider event"
        ),
    }
}
