//! Prometheus metrics for the queue engine.
//!
//! Metric names are exported as constants so the queue crate and the worker
//! agree on them. Recording goes through the `metrics` facade: without an
//! installed recorder every call is a no-op, which keeps unit tests free of
//! global state.
//!
//! # Example
//!
//! ```rust,no_run
//! use chairline_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//! // Metrics available at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use thiserror::Error;

// Re-export metrics macros for use in other crates
pub use metrics::{counter, gauge, histogram};

/// Tickets created, by booking channel.
pub const TICKETS_CREATED: &str = "queue_tickets_created_total";
/// Accepted status transitions, by target status.
pub const TRANSITIONS: &str = "queue_transitions_total";
/// Commands rejected before any write, by reason.
pub const COMMANDS_REJECTED: &str = "queue_commands_rejected_total";
/// Commits that lost an optimistic-lock race.
pub const CONFLICTS: &str = "queue_conflicts_total";
/// Time spent recalculating one provider's estimates.
pub const RECALCULATION_DURATION: &str = "queue_recalculation_duration_seconds";
/// Time spent applying one queue commit in the store.
pub const STORE_COMMIT_DURATION: &str = "queue_store_commit_duration_seconds";
/// Reminders delivered, by kind.
pub const REMINDERS_SENT: &str = "reminders_sent_total";
/// Reminder deliveries that failed, by kind.
pub const REMINDERS_FAILED: &str = "reminders_failed_total";
/// Time spent in one reminder sweep.
pub const SWEEP_DURATION: &str = "reminder_sweep_duration_seconds";

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build or install the metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics server.
///
/// Exposes metrics on an HTTP endpoint for Prometheus scraping.
#[derive(Debug, Clone, Copy)]
pub struct MetricsServer {
    addr: SocketAddr,
}

impl MetricsServer {
    /// Create a new metrics server bound to `addr` once started.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    /// The address the exporter listens on.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Register metric descriptions and install the Prometheus exporter.
    ///
    /// Must be called from within a tokio runtime; the exporter's HTTP
    /// listener runs as a background task.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Install`] if the bucket configuration is rejected
    /// or a global recorder is already installed.
    pub fn start(&self) -> Result<(), MetricsError> {
        register_metrics();

        PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0],
            )
            .map_err(|e| MetricsError::Install(e.to_string()))?
            .install()
            .map_err(|e| MetricsError::Install(e.to_string()))?;

        tracing::info!(addr = %self.addr, "Metrics exporter listening");
        Ok(())
    }
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(TICKETS_CREATED, "Total number of queue tickets created");
    describe_counter!(TRANSITIONS, "Total number of accepted ticket status transitions");
    describe_counter!(
        COMMANDS_REJECTED,
        "Total number of queue commands rejected before any write"
    );
    describe_counter!(
        CONFLICTS,
        "Total number of queue commits rejected by an optimistic-lock conflict"
    );
    describe_histogram!(
        RECALCULATION_DURATION,
        "Time taken to recalculate estimates for one provider and day"
    );
    describe_histogram!(
        STORE_COMMIT_DURATION,
        "Time taken to apply one queue commit transaction"
    );
    describe_counter!(REMINDERS_SENT, "Total number of reminders delivered");
    describe_counter!(REMINDERS_FAILED, "Total number of reminder deliveries that failed");
    describe_histogram!(SWEEP_DURATION, "Time taken by one reminder sweep");
}
