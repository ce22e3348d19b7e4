//! Optimistic concurrency between command handlers.

#![allow(clippy::expect_used)] // Tests can use expect
#![allow(clippy::unwrap_used)] // Tests can use unwrap

mod common;

use chairline_core::reducer::Reducer;
use chairline_queue::providers::TicketRepository;
use chairline_queue::{
    BookingChannel, Contact, NewTicket, ProviderQueue, QueueAction, QueueError, QueueNumber,
    QueueReducer, TicketId, TicketStatus,
};
use common::Shop;

fn new_ticket(shop: &Shop, sequence: u32) -> NewTicket {
    NewTicket {
        ticket_id: TicketId::new(),
        service: shop.haircut.clone(),
        customer_id: None,
        contact: Contact::new("Ana", format!("+1555010{sequence}")),
        channel: BookingChannel::WalkIn,
        requested_time: None,
        queue_number: QueueNumber::new("A", sequence),
    }
}

#[tokio::test]
async fn a_single_conflict_is_retried_transparently() {
    let shop = Shop::open();
    shop.store.inject_conflicts(1).unwrap();

    let ticket = shop.walk_in("Ana", "+15550101").await;

    assert_eq!(shop.stored(&ticket).position, 1);
    // Effects ran once, for the winning attempt only.
    assert_eq!(shop.events.event_types(), vec!["TicketCreated.v1"]);
    assert_eq!(shop.sender.attempts().len(), 1);
}

#[tokio::test]
async fn conflicts_beyond_the_retry_budget_surface() {
    let shop = Shop::open();
    let ticket = shop.walk_in("Ana", "+15550101").await;
    shop.events.clear();
    shop.store.inject_conflicts(2).unwrap();

    let err = shop
        .service
        .start_service(ticket.id, &shop.staff)
        .await
        .unwrap_err();

    assert!(matches!(err, QueueError::ConcurrentModification { .. }));
    assert!(err.is_retryable());
    assert_eq!(shop.stored(&ticket).status, TicketStatus::CheckedIn);
    assert!(shop.events.events().is_empty());
}

#[tokio::test]
async fn stale_snapshot_cannot_overwrite_a_newer_commit() {
    let shop = Shop::open();
    let env = shop.service.environment().clone();
    let reducer = QueueReducer::new();
    let day = shop.now().date_naive();

    let snapshot = shop.store.load_queue(shop.provider.id, day).await.unwrap();
    let mut winner = ProviderQueue::from_snapshot(snapshot.clone());
    let mut loser = ProviderQueue::from_snapshot(snapshot);

    for (queue, sequence) in [(&mut winner, 1), (&mut loser, 2)] {
        let _ = reducer.reduce(
            queue,
            QueueAction::CreateTicket {
                actor: shop.staff.clone(),
                ticket: new_ticket(&shop, sequence),
            },
            &env,
        );
        assert!(queue.last_error.is_none());
    }

    let winning = winner.take_commit().unwrap();
    let losing = loser.take_commit().unwrap();
    // Both saw an empty queue and picked the same position.
    assert_eq!(winning.inserted[0].position, losing.inserted[0].position);

    shop.store.commit(winning).await.unwrap();
    let err = shop.store.commit(losing).await.unwrap_err();

    assert!(matches!(err, QueueError::ConcurrentModification { .. }));
    assert_eq!(shop.store.all_tickets().len(), 1);
}

#[tokio::test]
async fn racing_creates_get_distinct_positions() {
    let shop = Shop::open();

    let (a, b, c) = tokio::join!(
        shop.walk_in("Ana", "+15550101"),
        shop.walk_in("Ben", "+15550102"),
        shop.walk_in("Cy", "+15550103"),
    );

    let mut positions = vec![a.position, b.position, c.position];
    positions.sort_unstable();
    assert_eq!(positions, vec![1, 2, 3]);

    let mut numbers: Vec<_> = [a, b, c]
        .iter()
        .map(|t| t.queue_number.as_str().to_string())
        .collect();
    numbers.sort();
    numbers.dedup();
    assert_eq!(numbers.len(), 3);
}
