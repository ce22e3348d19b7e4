//! Shared fixtures for queue integration tests.

#![allow(dead_code)] // Not every test binary uses every helper
#![allow(clippy::expect_used)] // Test fixtures

use chairline_core::environment::Clock;
use chairline_queue::mocks::{InMemoryQueueStore, RecordingEventSink, RecordingMessageSender};
use chairline_queue::{
    ActorContext, BookingChannel, Contact, CreateTicket, NotificationDispatcher, Provider,
    QueueConfig, QueueEnvironment, QueueService, ReminderScheduler, ServiceOffering, TenantId,
    Ticket,
};
use chairline_testing::{ManualClock, test_instant};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// A shop with one provider ("Rosa") offering a 30 minute haircut.
pub struct Shop {
    pub clock: ManualClock,
    pub store: Arc<InMemoryQueueStore>,
    pub sender: RecordingMessageSender,
    pub events: RecordingEventSink,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub service: QueueService<InMemoryQueueStore>,
    pub scheduler: ReminderScheduler<InMemoryQueueStore>,
    pub tenant: TenantId,
    pub provider: Provider,
    pub haircut: ServiceOffering,
    pub staff: ActorContext,
}

impl Shop {
    pub fn open() -> Self {
        Self::open_with(QueueConfig::default())
    }

    pub fn open_with(config: QueueConfig) -> Self {
        let clock = ManualClock::starting_at(test_instant());
        let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
        let store = Arc::new(InMemoryQueueStore::new());
        let sender = RecordingMessageSender::new();
        let events = RecordingEventSink::new();

        let tenant = TenantId::new();
        let provider = Provider::new(tenant, "Rosa");
        let haircut = ServiceOffering::new(tenant, "Haircut", 30);
        store.add_provider(provider.clone()).expect("seed provider");
        store.add_service(haircut.clone()).expect("seed service");

        let dispatcher = Arc::new(NotificationDispatcher::new(
            store.clone(),
            Arc::new(sender.clone()),
            shared_clock.clone(),
            config.reminders.clone(),
        ));
        let env = QueueEnvironment::new(
            shared_clock.clone(),
            Arc::new(events.clone()),
            dispatcher.clone(),
            config.clone(),
        );
        let service = QueueService::new(store.clone(), env);
        let scheduler = ReminderScheduler::new(
            store.clone(),
            dispatcher.clone(),
            shared_clock,
            config.reminders,
        );

        Self {
            clock,
            store,
            sender,
            events,
            dispatcher,
            service,
            scheduler,
            tenant,
            provider,
            haircut,
            staff: ActorContext::staff(tenant, Uuid::new_v4()),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn at(&self, minutes: i64) -> DateTime<Utc> {
        test_instant() + Duration::minutes(minutes)
    }

    pub fn request(&self, channel: BookingChannel, name: &str, phone: &str) -> CreateTicket {
        CreateTicket {
            provider_id: self.provider.id,
            service_id: self.haircut.id,
            customer_id: None,
            contact: Contact::new(name, phone),
            channel,
            requested_time: None,
        }
    }

    pub async fn walk_in(&self, name: &str, phone: &str) -> Ticket {
        self.service
            .create_ticket(&self.staff, self.request(BookingChannel::WalkIn, name, phone))
            .await
            .expect("walk-in accepted")
    }

    pub async fn book_online(&self, name: &str, phone: &str) -> Ticket {
        self.service
            .create_ticket(&self.staff, self.request(BookingChannel::Online, name, phone))
            .await
            .expect("online booking accepted")
    }

    pub fn stored(&self, ticket: &Ticket) -> Ticket {
        self.store.ticket(ticket.id).expect("ticket stored")
    }
}
