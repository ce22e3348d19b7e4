//! Collaborator interfaces.
//!
//! The engine owns queue logic and nothing else. Storage, outbound
//! messaging and live-update fan-out sit behind these traits and are
//! injected by the host:
//!
//! - **Testing**: in-memory mocks (see [`crate::mocks`])
//! - **Production**: Postgres store, SMS/push gateway, websocket hub
//!
//! Repository traits are generic (`impl Future` returns) and taken as type
//! parameters. Traits held behind `Arc<dyn ...>` in the reducer environment
//! return boxed futures so they stay object safe.

pub mod event_sink;
pub mod history;
pub mod message_sender;
pub mod notification_log;
pub mod repository;

pub use event_sink::EventSink;
pub use history::HistoryLog;
pub use message_sender::MessageSender;
pub use notification_log::{LogFuture, NotificationLog};
pub use repository::TicketRepository;
