//! Ticket history trait.
//!
//! History rows are appended as part of each [`QueueCommit`](crate::state::QueueCommit);
//! this trait is the read side.

use crate::error::Result;
use crate::types::{HistoryEntry, TicketId};

/// Read access to the append-only status history.
pub trait HistoryLog: Send + Sync {
    /// All entries for a ticket, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the backend fails.
    fn entries_for(
        &self,
        ticket_id: TicketId,
    ) -> impl std::future::Future<Output = Result<Vec<HistoryEntry>>> + Send;
}
