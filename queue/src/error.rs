//! Error types for queue commands and their collaborators.

use crate::status::TicketStatus;
use crate::types::{ProviderId, TicketId};
use thiserror::Error;

/// Result type alias for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;

/// Errors a queue command can fail with.
///
/// State-machine and tenant errors are raised before anything is written, so
/// a rejected command never leaves partial state behind.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    // ═══════════════════════════════════════════════════════════
    // Rejections (caller bug or stale client, never retried)
    // ═══════════════════════════════════════════════════════════

    /// The requested status change is not an edge of the ticket lifecycle.
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition {
        /// Current status
        from: TicketStatus,
        /// Requested status
        to: TicketStatus,
    },

    /// Unknown ticket, provider or service.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Kind of entity that was looked up
        entity: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// The caller's tenant does not own the entity it addressed.
    #[error("Cross-tenant access to {entity} {id} rejected")]
    CrossTenantAccess {
        /// Kind of entity that was addressed
        entity: &'static str,
        /// Identifier that was addressed
        id: String,
    },

    /// The provider is already serving another ticket.
    #[error("Provider {provider_id} is already serving ticket {ticket_id}")]
    ProviderBusy {
        /// The busy provider
        provider_id: ProviderId,
        /// The ticket currently in service
        ticket_id: TicketId,
    },

    // ═══════════════════════════════════════════════════════════
    // Persistence
    // ═══════════════════════════════════════════════════════════

    /// Another command committed first (optimistic-lock conflict).
    ///
    /// The whole command may be retried against a fresh snapshot.
    #[error("Concurrent modification of {entity} {id}")]
    ConcurrentModification {
        /// Kind of row whose version check failed
        entity: &'static str,
        /// Identifier of that row
        id: String,
    },

    /// Storage backend failure.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl QueueError {
    /// Shorthand for [`QueueError::NotFound`].
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Shorthand for [`QueueError::CrossTenantAccess`].
    pub fn cross_tenant(entity: &'static str, id: impl ToString) -> Self {
        Self::CrossTenantAccess {
            entity,
            id: id.to_string(),
        }
    }

    /// Shorthand for [`QueueError::ConcurrentModification`].
    pub fn conflict(entity: &'static str, id: impl ToString) -> Self {
        Self::ConcurrentModification {
            entity,
            id: id.to_string(),
        }
    }

    /// Returns `true` if re-running the whole command may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentModification { .. })
    }

    /// Returns `true` for tenant-boundary violations.
    #[must_use]
    pub const fn is_security_relevant(&self) -> bool {
        matches!(self, Self::CrossTenantAccess { .. })
    }

    /// Stable label for metrics.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::NotFound { .. } => "not_found",
            Self::CrossTenantAccess { .. } => "cross_tenant_access",
            Self::ProviderBusy { .. } => "provider_busy",
            Self::ConcurrentModification { .. } => "concurrent_modification",
            Self::Storage(_) => "storage",
        }
    }
}

/// Outbound message delivery failure.
///
/// Recorded as a failed notification record; never returned to the caller
/// of the command that triggered the message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The gateway refused the message.
    #[error("Message rejected: {0}")]
    Rejected(String),

    /// The gateway could not be reached.
    #[error("Gateway unavailable: {0}")]
    Unavailable(String),
}

/// Failure to hand a domain event to the live-update fan-out.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Event publication failed: {0}")]
pub struct EventSinkError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_conflicts_are_retryable() {
        assert!(QueueError::conflict("ticket", "t-1").is_retryable());
        assert!(!QueueError::not_found("ticket", "t-1").is_retryable());
        assert!(
            !QueueError::InvalidTransition {
                from: TicketStatus::Booked,
                to: TicketStatus::Done
            }
            .is_retryable()
        );
    }

    #[test]
    fn invalid_transition_names_the_pair() {
        let err = QueueError::InvalidTransition {
            from: TicketStatus::Booked,
            to: TicketStatus::Done,
        };
        assert_eq!(err.to_string(), "Invalid transition from BOOKED to DONE");
        assert_eq!(err.reason(), "invalid_transition");
    }

    #[test]
    fn cross_tenant_is_security_relevant() {
        let err = QueueError::cross_tenant("ticket", "t-9");
        assert!(err.is_security_relevant());
        assert!(!QueueError::Storage("down".into()).is_security_relevant());
    }
}
