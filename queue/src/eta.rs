//! Estimated start and end times for one provider's queue.
//!
//! The walk is a single pass over waiting tickets in position order:
//!
//! 1. Seed a cursor. If a ticket is in service and has started, the cursor is
//!    its `actual_start + estimated_duration` (even when that lies in the
//!    past, so an overrunning service does not silently shift everyone).
//!    Otherwise the cursor is `now`, which the caller has already moved to
//!    the service-day's opening time when the day lies ahead.
//! 2. For each waiting ticket: if anything precedes it (the in-service ticket
//!    or an earlier waiting ticket), add the buffer; estimate
//!    `[cursor, cursor + duration]`; move the cursor to the estimated end.
//!
//! Terminal tickets take no part and are never modified.

use crate::types::{Ticket, TicketId};
use chrono::{DateTime, Duration, Utc};

/// Estimated window for one waiting ticket.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Estimate {
    /// Ticket the estimate is for
    pub ticket_id: TicketId,
    /// Estimated start
    pub start: DateTime<Utc>,
    /// Estimated end
    pub end: DateTime<Utc>,
}

/// Where the walk starts and whether the first waiting ticket is preceded.
fn seed(tickets: &[Ticket], now: DateTime<Utc>) -> (DateTime<Utc>, bool) {
    tickets
        .iter()
        .filter(|t| t.status == crate::status::TicketStatus::InService)
        .filter_map(|t| t.actual_start.map(|start| start + t.estimated_duration()))
        .max()
        .map_or((now, false), |cursor| (cursor, true))
}

/// Compute estimates for every waiting ticket without touching them.
///
/// `tickets` must belong to a single provider and service-day; order does
/// not matter.
#[must_use]
pub fn schedule(tickets: &[Ticket], now: DateTime<Utc>, buffer: Duration) -> Vec<Estimate> {
    let (mut cursor, mut preceded) = seed(tickets, now);

    let mut waiting: Vec<&Ticket> = tickets.iter().filter(|t| t.is_waiting()).collect();
    waiting.sort_by_key(|t| t.position);

    waiting
        .into_iter()
        .map(|ticket| {
            if preceded {
                cursor += buffer;
            }
            let start = cursor;
            let end = start + ticket.estimated_duration();
            cursor = end;
            preceded = true;
            Estimate {
                ticket_id: ticket.id,
                start,
                end,
            }
        })
        .collect()
}

/// Apply [`schedule`] to `tickets`, returning the IDs whose estimate changed.
///
/// Running it twice with the same `now` changes nothing the second time.
pub fn recalculate(tickets: &mut [Ticket], now: DateTime<Utc>, buffer: Duration) -> Vec<TicketId> {
    let estimates = schedule(tickets, now, buffer);
    let mut changed = Vec::new();

    for estimate in estimates {
        if let Some(ticket) = tickets.iter_mut().find(|t| t.id == estimate.ticket_id) {
            if ticket.set_estimate(estimate.start) {
                changed.push(ticket.id);
            }
        }
    }

    changed
}

/// Whether a queue's estimates have fallen behind the clock.
///
/// True when some waiting ticket has no estimate or an estimated start
/// before `now`. Idle queues are refreshed only in that case so they do not
/// drift by a minute on every tick.
#[must_use]
pub fn is_stale(tickets: &[Ticket], now: DateTime<Utc>) -> bool {
    tickets
        .iter()
        .filter(|t| t.is_waiting())
        .any(|t| t.estimated_start.is_none_or(|start| start < now))
}
