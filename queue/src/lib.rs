//! # Chairline Queue
//!
//! Queue scheduling and estimation engine for walk-in service businesses.
//!
//! Each provider (a barber, a stylist) has one queue per service-day. Tickets
//! move through a small lifecycle, every accepted move recalculates the
//! estimated start and end of everyone still waiting, and a periodic sweep
//! sends reminders as estimated starts approach.
//!
//! ## Architecture
//!
//! ```text
//! QueueService (shell)            ReminderScheduler
//!   │ load / commit / retry          │ active tickets around now
//!   ▼                                ▼
//! QueueReducer (pure) ──effects──► NotificationDispatcher ──► MessageSender
//!   │ status graph, ETA walk         │ claim / record
//!   ▼                                ▼
//! TicketRepository               NotificationLog
//! ```
//!
//! - [`status`]: the ticket lifecycle graph
//! - [`eta`]: estimate calculation
//! - [`reducer`]: decisions for one provider's queue
//! - [`service`]: command handlers with optimistic concurrency
//! - [`scheduler`]: reminder thresholds and the sweep loop
//! - [`notify`]: at-most-once message delivery
//! - [`providers`]: storage, messaging and event-sink interfaces
//!
//! ## Example
//!
//! ```ignore
//! let service = QueueService::new(store.clone(), env);
//! let ticket = service.create_ticket(&staff, CreateTicket { .. }).await?;
//! service.start_service(ticket.id, &staff).await?;
//! ```

pub mod access;
pub mod actions;
pub mod config;
pub mod environment;
pub mod error;
pub mod eta;
pub mod events;
pub mod notify;
pub mod providers;
pub mod reducer;
pub mod scheduler;
pub mod service;
pub mod state;
pub mod status;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;

pub use actions::{NewTicket, QueueAction};
pub use config::{QueueConfig, ReminderConfig};
pub use environment::QueueEnvironment;
pub use error::{DeliveryError, EventSinkError, QueueError, Result};
pub use events::{BroadcastEventSink, TicketEvent};
pub use notify::{DispatchOutcome, NotificationDispatcher};
pub use reducer::QueueReducer;
pub use scheduler::{ReminderScheduler, SweepReport};
pub use service::{CreateTicket, QueueService};
pub use state::{ProviderQueue, QueueCommit, QueueSnapshot};
pub use status::{TicketStatus, TransitionKind};
pub use types::{
    ActorContext, ActorRef, BookingChannel, Contact, CustomerId, DeliveryOutcome, HistoryEntry,
    NotificationRecord, Provider, ProviderId, ProviderStatus, QueueNumber, ReminderKind, Role,
    ServiceId, ServiceOffering, TenantId, Ticket, TicketId,
};
