//! Injected dependencies of the queue reducer.

use crate::config::QueueConfig;
use crate::notify::NotificationDispatcher;
use crate::providers::EventSink;
use chairline_core::environment::Clock;
use std::sync::Arc;

/// Environment for [`QueueReducer`](crate::reducer::QueueReducer).
///
/// The reducer reads the clock and config directly; the sink and dispatcher
/// are only captured by effects and used after commit.
#[derive(Clone)]
pub struct QueueEnvironment {
    /// Source of "now"
    pub clock: Arc<dyn Clock>,
    /// Live-update fan-out
    pub events: Arc<dyn EventSink>,
    /// Guarded notification delivery
    pub notifications: Arc<NotificationDispatcher>,
    /// Engine configuration
    pub config: Arc<QueueConfig>,
}

impl QueueEnvironment {
    /// Create an environment.
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventSink>,
        notifications: Arc<NotificationDispatcher>,
        config: QueueConfig,
    ) -> Self {
        Self {
            clock,
            events,
            notifications,
            config: Arc::new(config),
        }
    }
}

impl std::fmt::Debug for QueueEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueEnvironment")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
