//! `PostgreSQL` storage for the Chairline queue engine.
//!
//! [`PostgresQueueStore`] implements the engine's storage traits over one
//! connection pool:
//!
//! - `TicketRepository`: snapshots, queue numbers and atomic commits with
//!   optimistic version checks
//! - `HistoryLog`: the append-only status history
//! - `NotificationLog`: delivery records and send claims
//!
//! Schema lives in `migrations/` and is applied with
//! [`PostgresQueueStore::migrate`].
//!
//! # Example
//!
//! ```ignore
//! use chairline_postgres::PostgresQueueStore;
//!
//! let store = Arc::new(PostgresQueueStore::new(pool));
//! store.migrate().await?;
//! let service = QueueService::new(store.clone(), env);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod notifications;
mod rows;
mod store;

pub use store::PostgresQueueStore;
