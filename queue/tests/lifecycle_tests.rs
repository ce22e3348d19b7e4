//! Ticket lifecycle through the command handlers.

#![allow(clippy::expect_used)] // Tests can use expect
#![allow(clippy::unwrap_used)] // Tests can use unwrap

mod common;

use chairline_queue::providers::TicketRepository;
use chairline_queue::{
    ActorContext, BookingChannel, ProviderQueue, ProviderStatus, QueueError, ReminderKind,
    TicketId, TicketStatus, TransitionKind,
};
use common::Shop;

#[tokio::test]
async fn full_service_records_three_transitions() {
    let shop = Shop::open();
    let ticket = shop.book_online("Dana", "+15550101").await;

    shop.service.check_in(ticket.id, &shop.staff).await.unwrap();
    shop.clock.advance_minutes(10);
    let started = shop.service.start_service(ticket.id, &shop.staff).await.unwrap();
    shop.clock.advance_minutes(25);
    let done = shop.service.complete(ticket.id, &shop.staff).await.unwrap();

    assert_eq!(done.status, TicketStatus::Done);
    assert_eq!(started.actual_start, Some(shop.at(10)));
    assert!(done.actual_end.unwrap() >= done.actual_start.unwrap());

    let history = shop.service.ticket_history(ticket.id, &shop.staff).await.unwrap();
    let statuses: Vec<_> = history.iter().map(|h| h.status).collect();
    assert_eq!(
        statuses,
        vec![
            TicketStatus::Booked,
            TicketStatus::CheckedIn,
            TicketStatus::InService,
            TicketStatus::Done,
        ]
    );
    assert_eq!(history.iter().skip(1).count(), 3);
    assert!(history.iter().all(|h| h.actor == shop.staff.reference()));
}

#[tokio::test]
async fn booked_straight_to_done_is_rejected_without_history() {
    let shop = Shop::open();
    let ticket = shop.book_online("Dana", "+15550101").await;
    let commits = shop.store.commit_count();

    let err = shop
        .service
        .complete(ticket.id, &shop.staff)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        QueueError::InvalidTransition {
            from: TicketStatus::Booked,
            to: TicketStatus::Done,
        }
    );
    assert_eq!(shop.stored(&ticket).status, TicketStatus::Booked);
    assert_eq!(shop.store.commit_count(), commits);
    let history = shop.service.ticket_history(ticket.id, &shop.staff).await.unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn every_illegal_pair_is_rejected_and_leaves_status_alone() {
    let kinds = [
        TransitionKind::CheckIn,
        TransitionKind::Start,
        TransitionKind::Complete,
        TransitionKind::NoShow,
        TransitionKind::Cancel,
    ];

    // Drive a fresh ticket to each status, then try every command on it.
    let paths: [(TicketStatus, &[TransitionKind]); 6] = [
        (TicketStatus::Booked, &[]),
        (TicketStatus::CheckedIn, &[TransitionKind::CheckIn]),
        (TicketStatus::InService, &[TransitionKind::CheckIn, TransitionKind::Start]),
        (
            TicketStatus::Done,
            &[TransitionKind::CheckIn, TransitionKind::Start, TransitionKind::Complete],
        ),
        (TicketStatus::Canceled, &[TransitionKind::Cancel]),
        (TicketStatus::NoShow, &[TransitionKind::NoShow]),
    ];

    for (status, path) in paths {
        for kind in kinds {
            if status.can_transition_to(kind.target()) {
                continue;
            }
            let shop = Shop::open();
            let ticket = shop.book_online("Dana", "+15550101").await;
            for step in path {
                shop.service
                    .transition(ticket.id, *step, &shop.staff, None)
                    .await
                    .unwrap();
            }
            let history_before = shop.service.ticket_history(ticket.id, &shop.staff).await.unwrap();

            let err = shop
                .service
                .transition(ticket.id, kind, &shop.staff, None)
                .await
                .unwrap_err();

            assert_eq!(
                err,
                QueueError::InvalidTransition {
                    from: status,
                    to: kind.target()
                },
                "{status} -> {}",
                kind.target()
            );
            assert_eq!(shop.stored(&ticket).status, status);
            let history_after = shop.service.ticket_history(ticket.id, &shop.staff).await.unwrap();
            assert_eq!(history_before, history_after);
        }
    }
}

#[tokio::test]
async fn walk_ins_start_checked_in_with_sequential_numbers() {
    let shop = Shop::open();

    let first = shop.walk_in("Ana", "+15550101").await;
    let second = shop.book_online("Ben", "+15550102").await;

    assert_eq!(first.status, TicketStatus::CheckedIn);
    assert_eq!(first.channel, BookingChannel::WalkIn);
    assert_eq!(second.status, TicketStatus::Booked);
    assert_eq!(first.queue_number.as_str(), "A001");
    assert_eq!(second.queue_number.as_str(), "A002");
    assert_eq!((first.position, second.position), (1, 2));
}

#[tokio::test]
async fn positions_are_never_reused_after_cancellation() {
    let shop = Shop::open();
    let first = shop.walk_in("Ana", "+15550101").await;
    let second = shop.walk_in("Ben", "+15550102").await;

    shop.service
        .cancel_ticket(second.id, &shop.staff, Some("changed plans".into()))
        .await
        .unwrap();
    let third = shop.walk_in("Cy", "+15550103").await;

    assert_eq!(first.position, 1);
    assert_eq!(third.position, 3);
    let stored = shop.stored(&second);
    assert_eq!(stored.cancellation_reason.as_deref(), Some("changed plans"));
}

#[tokio::test]
async fn provider_follows_service_state() {
    let shop = Shop::open();
    let ticket = shop.walk_in("Ana", "+15550101").await;

    shop.service.start_service(ticket.id, &shop.staff).await.unwrap();
    assert_eq!(
        shop.store.provider(shop.provider.id).unwrap().status,
        ProviderStatus::Busy
    );

    shop.service.complete(ticket.id, &shop.staff).await.unwrap();
    assert_eq!(
        shop.store.provider(shop.provider.id).unwrap().status,
        ProviderStatus::Available
    );
}

#[tokio::test]
async fn no_show_frees_a_provider_left_busy() {
    let shop = Shop::open();
    let ticket = shop.walk_in("Ana", "+15550101").await;
    let mut provider = shop.store.provider(shop.provider.id).unwrap();
    provider.status = ProviderStatus::Busy;
    shop.store.put_provider(provider).unwrap();

    shop.service.mark_no_show(ticket.id, &shop.staff).await.unwrap();

    assert_eq!(
        shop.store.provider(shop.provider.id).unwrap().status,
        ProviderStatus::Available
    );
}

#[tokio::test]
async fn break_status_survives_cancellations() {
    let shop = Shop::open();
    let ticket = shop.walk_in("Ana", "+15550101").await;
    let mut provider = shop.store.provider(shop.provider.id).unwrap();
    provider.status = ProviderStatus::OnBreak;
    shop.store.put_provider(provider).unwrap();

    shop.service
        .cancel_ticket(ticket.id, &shop.staff, None)
        .await
        .unwrap();

    assert_eq!(
        shop.store.provider(shop.provider.id).unwrap().status,
        ProviderStatus::OnBreak
    );
}

#[tokio::test]
async fn one_ticket_in_service_at_a_time() {
    let shop = Shop::open();
    let first = shop.walk_in("Ana", "+15550101").await;
    let second = shop.walk_in("Ben", "+15550102").await;

    shop.service.start_service(first.id, &shop.staff).await.unwrap();
    let err = shop
        .service
        .start_service(second.id, &shop.staff)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        QueueError::ProviderBusy {
            provider_id: shop.provider.id,
            ticket_id: first.id,
        }
    );
    assert_eq!(shop.stored(&second).status, TicketStatus::CheckedIn);
}

#[tokio::test]
async fn unknown_ticket_is_not_found() {
    let shop = Shop::open();
    let err = shop
        .service
        .check_in(TicketId::new(), &shop.staff)
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::NotFound { entity: "ticket", .. }));
}

#[tokio::test]
async fn transitions_publish_events_and_customer_messages() {
    let shop = Shop::open();
    let ticket = shop.walk_in("Ana", "+15550101").await;
    shop.service.start_service(ticket.id, &shop.staff).await.unwrap();
    shop.service.complete(ticket.id, &shop.staff).await.unwrap();

    let types = shop.events.event_types();
    assert_eq!(types.first(), Some(&"TicketCreated.v1"));
    assert_eq!(
        types.iter().filter(|t| **t == "ProviderStatusChanged.v1").count(),
        2
    );

    let kinds: Vec<_> = shop
        .dispatcher
        .records_for(ticket.id)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            ReminderKind::BookingConfirmed,
            ReminderKind::YourTurn,
            ReminderKind::ThankYou,
        ]
    );
}

#[tokio::test]
async fn gateway_outage_does_not_fail_the_command() {
    let shop = Shop::open();
    shop.sender.set_offline(true);

    let ticket = shop.walk_in("Ana", "+15550101").await;

    assert_eq!(shop.stored(&ticket).status, TicketStatus::CheckedIn);
    assert!(shop.sender.delivered().is_empty());
    assert_eq!(shop.sender.attempts().len(), 1);
}

#[tokio::test]
async fn snapshot_keeps_terminal_tickets_out() {
    let shop = Shop::open();
    let kept = shop.walk_in("Ana", "+15550101").await;
    let gone = shop.walk_in("Ben", "+15550102").await;
    shop.service.mark_no_show(gone.id, &shop.staff).await.unwrap();

    let queue = shop
        .service
        .provider_queue_snapshot(shop.provider.id, shop.now().date_naive(), &shop.staff)
        .await
        .unwrap();

    assert_eq!(queue.iter().map(|t| t.id).collect::<Vec<_>>(), vec![kept.id]);
}

#[tokio::test]
async fn terminal_ticket_loaded_explicitly_reports_its_status() {
    let shop = Shop::open();
    let ticket = shop.walk_in("Ana", "+15550101").await;
    shop.service.mark_no_show(ticket.id, &shop.staff).await.unwrap();

    // The snapshot never lists terminal tickets; the shell adds the target.
    let snapshot = shop
        .store
        .load_queue(shop.provider.id, ticket.service_day)
        .await
        .unwrap();
    assert!(snapshot.tickets.is_empty());
    let mut queue = ProviderQueue::from_snapshot(snapshot);
    queue.include(shop.stored(&ticket));
    assert_eq!(queue.ticket(ticket.id).unwrap().status, TicketStatus::NoShow);

    let err = shop
        .service
        .check_in(ticket.id, &ActorContext::system(shop.tenant))
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::InvalidTransition { from: TicketStatus::NoShow, .. }));
}
