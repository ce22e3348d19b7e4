//! Live-update fan-out trait.

use crate::error::EventSinkError;
use crate::events::TicketEvent;
use std::future::Future;
use std::pin::Pin;

/// Receives domain events once their commit is durable.
///
/// Implementations must not block for long; the command that produced the
/// event is waiting on it.
pub trait EventSink: Send + Sync {
    /// Publish one event.
    ///
    /// # Errors
    ///
    /// Returns [`EventSinkError`] if the event could not be handed off.
    fn publish(
        &self,
        event: TicketEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventSinkError>> + Send + '_>>;
}
