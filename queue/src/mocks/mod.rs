//! In-memory collaborators for tests and demos.
//!
//! Deterministic, single-process implementations of every provider trait.
//! The store mirrors the durable store's consistency rules (version checks,
//! unique positions, one successful delivery per reminder) so concurrency
//! tests exercise the real conflict paths.

pub mod events;
pub mod sender;
pub mod store;

pub use events::RecordingEventSink;
pub use sender::{RecordingMessageSender, SentMessage};
pub use store::InMemoryQueueStore;
