//! Property tests for the lifecycle graph and the estimate walk.

#![allow(clippy::unwrap_used)] // Tests can use unwrap

use chairline_queue::eta;
use chairline_queue::{
    BookingChannel, Contact, ProviderId, QueueError, QueueNumber, ServiceId, TenantId, Ticket,
    TicketId, TicketStatus,
};
use chairline_testing::test_instant;
use chrono::Duration;
use proptest::prelude::*;

fn status() -> impl Strategy<Value = TicketStatus> {
    prop::sample::select(TicketStatus::ALL.to_vec())
}

fn ticket(provider_id: ProviderId, position: u32, status: TicketStatus, minutes: u32) -> Ticket {
    let now = test_instant();
    Ticket {
        id: TicketId::new(),
        tenant_id: TenantId::new(),
        provider_id,
        service_id: ServiceId::new(),
        customer_id: None,
        contact: Contact::new("Guest", "+15550100"),
        channel: BookingChannel::WalkIn,
        status,
        queue_number: QueueNumber::new("A", position),
        service_day: now.date_naive(),
        position,
        estimated_duration_minutes: minutes,
        requested_time: None,
        estimated_start: None,
        estimated_end: None,
        actual_start: (status == TicketStatus::InService).then_some(now),
        actual_end: None,
        cancellation_reason: None,
        version: 1,
        created_at: now,
        updated_at: now,
    }
}

/// A queue with at most one ticket in service, in shuffled order.
fn queue() -> impl Strategy<Value = Vec<Ticket>> {
    let waiting = prop::sample::select(vec![
        TicketStatus::Booked,
        TicketStatus::CheckedIn,
        TicketStatus::Done,
        TicketStatus::Canceled,
        TicketStatus::NoShow,
    ]);
    (
        prop::collection::vec((waiting, 5u32..=120), 0..12),
        prop::option::of(5u32..=120),
    )
        .prop_flat_map(|(rows, serving)| {
            let provider_id = ProviderId::new();
            let mut tickets: Vec<Ticket> = rows
                .into_iter()
                .enumerate()
                .map(|(i, (status, minutes))| {
                    ticket(provider_id, u32::try_from(i).unwrap() + 2, status, minutes)
                })
                .collect();
            if let Some(minutes) = serving {
                tickets.push(ticket(provider_id, 1, TicketStatus::InService, minutes));
            }
            Just(tickets).prop_shuffle()
        })
}

proptest! {
    #[test]
    fn transitions_outside_the_graph_are_rejected(from in status(), to in status()) {
        let result = from.transition_to(to);
        if from.can_transition_to(to) {
            prop_assert_eq!(result, Ok(to));
        } else {
            prop_assert_eq!(result, Err(QueueError::InvalidTransition { from, to }));
        }
    }

    #[test]
    fn terminal_statuses_have_no_way_out(from in status(), to in status()) {
        if from.is_terminal() {
            prop_assert!(!from.can_transition_to(to));
        }
    }

    #[test]
    fn recalculating_twice_changes_nothing(mut tickets in queue(), buffer in 0i64..=15) {
        let now = test_instant() + Duration::minutes(7);
        let buffer = Duration::minutes(buffer);

        eta::recalculate(&mut tickets, now, buffer);
        let settled = tickets.clone();
        let changed = eta::recalculate(&mut tickets, now, buffer);

        prop_assert!(changed.is_empty());
        prop_assert_eq!(tickets, settled);
    }

    #[test]
    fn waiting_tickets_are_served_in_position_order(tickets in queue(), buffer in 0i64..=15) {
        let now = test_instant();
        let buffer = Duration::minutes(buffer);

        let estimates = eta::schedule(&tickets, now, buffer);
        let positions: Vec<u32> = estimates
            .iter()
            .map(|e| tickets.iter().find(|t| t.id == e.ticket_id).unwrap().position)
            .collect();

        prop_assert_eq!(estimates.len(), tickets.iter().filter(|t| t.is_waiting()).count());
        prop_assert!(positions.windows(2).all(|w| w[0] < w[1]));
        for pair in estimates.windows(2) {
            prop_assert_eq!(pair[1].start, pair[0].end + buffer);
        }
        for estimate in &estimates {
            prop_assert!(estimate.start >= now);
            prop_assert!(estimate.end > estimate.start);
        }
    }

    #[test]
    fn terminal_tickets_are_never_touched(mut tickets in queue()) {
        let before: Vec<Ticket> = tickets.iter().filter(|t| t.status.is_terminal()).cloned().collect();

        eta::recalculate(&mut tickets, test_instant(), Duration::minutes(5));

        let after: Vec<Ticket> = tickets.iter().filter(|t| t.status.is_terminal()).cloned().collect();
        prop_assert_eq!(before, after);
    }
}
