//! Chairline worker.
//!
//! Connects to `PostgreSQL`, then on every tick refreshes stale queue
//! estimates and sweeps for due reminders until Ctrl+C or SIGTERM.

mod config;
mod sender;

use anyhow::Context;
use chairline_core::environment::{Clock, SystemClock};
use chairline_postgres::PostgresQueueStore;
use chairline_queue::scheduler::sweep_days;
use chairline_queue::{
    BroadcastEventSink, NotificationDispatcher, QueueEnvironment, QueueService, ReminderScheduler,
};
use chairline_runtime::metrics::MetricsServer;
use chrono::{DateTime, Utc};
use config::WorkerConfig;
use sender::{LoggingMessageSender, log_events};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; the environment may be set directly.
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chairline=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Chairline worker");

    let config = WorkerConfig::from_env().context("Invalid worker configuration")?;
    info!(
        metrics_addr = %config.metrics_addr,
        sweep_interval_secs = config.sweep_interval_secs,
        refresh_estimates = config.refresh_estimates,
        "Configuration loaded"
    );

    MetricsServer::new(config.metrics_addr)
        .start()
        .context("Failed to start metrics exporter")?;

    info!("Connecting to PostgreSQL...");
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout())
        .connect(&config.database_url)
        .await
        .context("Failed to connect to PostgreSQL")?;
    let store = Arc::new(PostgresQueueStore::new(pool));
    store.migrate().await.context("Failed to run migrations")?;
    info!("Database ready");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let events = BroadcastEventSink::default();
    let dispatcher = Arc::new(NotificationDispatcher::new(
        store.clone(),
        Arc::new(LoggingMessageSender),
        clock.clone(),
        config.queue.reminders.clone(),
    ));
    let env = QueueEnvironment::new(
        clock.clone(),
        Arc::new(events.clone()),
        dispatcher.clone(),
        config.queue.clone(),
    );
    let service = QueueService::new(store.clone(), env);
    let scheduler = ReminderScheduler::new(store, dispatcher, clock, config.queue.reminders.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let event_logger = tokio::spawn(log_events(events, shutdown_rx.clone()));
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let refresh = config.refresh_estimates;
    let service = &service;
    scheduler
        .run_with(config.sweep_interval(), shutdown_rx, move |now: DateTime<Utc>| async move {
            if !refresh {
                return;
            }
            match service.refresh_estimates(&sweep_days(now)).await {
                Ok(0) => {},
                Ok(refreshed) => info!(refreshed, "Refreshed stale estimates"),
                Err(e) => error!(error = %e, "Estimate refresh failed"),
            }
        })
        .await;

    if let Err(e) = event_logger.await {
        error!(error = %e, "Event logger task failed");
    }

    info!("Worker stopped");
    Ok(())
}

/// Wait for Ctrl+C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            },
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
