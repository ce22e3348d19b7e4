//! Ticket lifecycle.
//!
//! ```text
//! BOOKED ──► CHECKED_IN ──► IN_SERVICE ──► DONE
//!   │            │
//!   ├──► CANCELED ◄┤
//!   └──► NO_SHOW  ◄┘
//! ```
//!
//! `DONE`, `CANCELED` and `NO_SHOW` are terminal. The graph is the single
//! authority on what may happen to a ticket; every command goes through
//! [`TicketStatus::transition_to`].

use crate::error::{QueueError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status of a ticket in a provider's queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    /// Reserved, customer not yet on site
    Booked,
    /// Customer is present and waiting
    CheckedIn,
    /// Being served right now
    InService,
    /// Service finished
    Done,
    /// Withdrawn before service
    Canceled,
    /// Customer never showed up
    NoShow,
}

impl TicketStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [Self; 6] = [
        Self::Booked,
        Self::CheckedIn,
        Self::InService,
        Self::Done,
        Self::Canceled,
        Self::NoShow,
    ];

    /// Whether `self -> to` is an edge of the lifecycle graph.
    #[must_use]
    pub const fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Booked, Self::CheckedIn)
                | (Self::CheckedIn, Self::InService)
                | (Self::InService, Self::Done)
                | (Self::Booked | Self::CheckedIn, Self::Canceled | Self::NoShow)
        )
    }

    /// Validate `self -> to`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidTransition`] when the pair is not an edge.
    pub fn transition_to(self, to: Self) -> Result<Self> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(QueueError::InvalidTransition { from: self, to })
        }
    }

    /// Statuses reachable from `self` in one step.
    #[must_use]
    pub fn allowed_targets(self) -> Vec<Self> {
        Self::ALL
            .into_iter()
            .filter(|to| self.can_transition_to(*to))
            .collect()
    }

    /// No transition leaves a terminal status.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Canceled | Self::NoShow)
    }

    /// Waiting tickets are the ones that get an estimate.
    #[must_use]
    pub const fn is_waiting(self) -> bool {
        matches!(self, Self::Booked | Self::CheckedIn)
    }

    /// Active = not terminal.
    #[must_use]
    pub const fn is_active(self) -> bool {
        !self.is_terminal()
    }

    /// Stored and wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Booked => "BOOKED",
            Self::CheckedIn => "CHECKED_IN",
            Self::InService => "IN_SERVICE",
            Self::Done => "DONE",
            Self::Canceled => "CANCELED",
            Self::NoShow => "NO_SHOW",
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown status string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown ticket status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for TicketStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// Named staff/customer commands and the status each one targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    /// `BOOKED -> CHECKED_IN`
    CheckIn,
    /// `CHECKED_IN -> IN_SERVICE`
    Start,
    /// `IN_SERVICE -> DONE`
    Complete,
    /// `BOOKED | CHECKED_IN -> NO_SHOW`
    NoShow,
    /// `BOOKED | CHECKED_IN -> CANCELED`
    Cancel,
}

impl TransitionKind {
    /// The status this command moves a ticket to.
    #[must_use]
    pub const fn target(self) -> TicketStatus {
        match self {
            Self::CheckIn => TicketStatus::CheckedIn,
            Self::Start => TicketStatus::InService,
            Self::Complete => TicketStatus::Done,
            Self::NoShow => TicketStatus::NoShow,
            Self::Cancel => TicketStatus::Canceled,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;

    #[test]
    fn forward_path_is_allowed() {
        assert!(TicketStatus::Booked.can_transition_to(TicketStatus::CheckedIn));
        assert!(TicketStatus::CheckedIn.can_transition_to(TicketStatus::InService));
        assert!(TicketStatus::InService.can_transition_to(TicketStatus::Done));
    }

    #[test]
    fn skipping_check_in_is_rejected() {
        let err = TicketStatus::Booked
            .transition_to(TicketStatus::InService)
            .unwrap_err();
        assert_eq!(
            err,
            QueueError::InvalidTransition {
                from: TicketStatus::Booked,
                to: TicketStatus::InService
            }
        );
    }

    #[test]
    fn in_service_cannot_be_canceled() {
        assert!(!TicketStatus::InService.can_transition_to(TicketStatus::Canceled));
        assert!(!TicketStatus::InService.can_transition_to(TicketStatus::NoShow));
    }

    #[test]
    fn terminal_statuses_have_no_targets() {
        for status in TicketStatus::ALL.into_iter().filter(|s| s.is_terminal()) {
            assert!(status.allowed_targets().is_empty(), "{status} has targets");
        }
    }

    #[test]
    fn self_transitions_are_never_allowed() {
        for status in TicketStatus::ALL {
            assert!(!status.can_transition_to(status));
        }
    }

    #[test]
    fn edge_count_matches_lifecycle() {
        let edges: usize = TicketStatus::ALL
            .into_iter()
            .map(|s| s.allowed_targets().len())
            .sum();
        assert_eq!(edges, 7);
    }

    #[test]
    fn string_form_round_trips() {
        for status in TicketStatus::ALL {
            assert_eq!(status.as_str().parse::<TicketStatus>(), Ok(status));
        }
        assert!("SERVED".parse::<TicketStatus>().is_err());
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&TicketStatus::CheckedIn).unwrap();
        assert_eq!(json, "\"CHECKED_IN\"");
    }

    #[test]
    fn commands_target_expected_statuses() {
        assert_eq!(TransitionKind::CheckIn.target(), TicketStatus::CheckedIn);
        assert_eq!(TransitionKind::Start.target(), TicketStatus::InService);
        assert_eq!(TransitionKind::Complete.target(), TicketStatus::Done);
        assert_eq!(TransitionKind::NoShow.target(), TicketStatus::NoShow);
        assert_eq!(TransitionKind::Cancel.target(), TicketStatus::Canceled);
    }
}
