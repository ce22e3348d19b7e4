//! Worker configuration.
//!
//! Process settings come from environment variables (after `.env` is
//! loaded); queue tunables are read by [`QueueConfig::from_env`].

use chairline_queue::QueueConfig;
use std::env;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Invalid or missing worker settings.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    /// A variable is set but cannot be parsed.
    #[error("Invalid value for {name}: {value}")]
    Invalid {
        /// Variable name
        name: &'static str,
        /// Raw value
        value: String,
    },
}

/// Settings for the worker process.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// `PostgreSQL` connection URL (`DATABASE_URL`, required)
    pub database_url: String,
    /// Maximum pool size (default: 10)
    pub max_connections: u32,
    /// Minimum idle connections (default: 1)
    pub min_connections: u32,
    /// Pool acquire timeout in seconds (default: 30)
    pub acquire_timeout_secs: u64,
    /// Prometheus exporter address (default: `0.0.0.0:9090`)
    pub metrics_addr: SocketAddr,
    /// Seconds between ticks (default: 60)
    pub sweep_interval_secs: u64,
    /// Recalculate stale queues before each sweep (default: true)
    pub refresh_estimates: bool,
    /// Queue engine tunables
    pub queue: QueueConfig,
}

impl WorkerConfig {
    /// Load from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `DATABASE_URL` is missing or a value
    /// cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::from_lookup(|name| env::var(name).ok())?;
        config.queue = QueueConfig::from_env();
        Ok(config)
    }

    /// Load from an arbitrary variable source. Queue tunables keep their
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `DATABASE_URL` is missing or a value
    /// cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        Ok(Self {
            database_url,
            max_connections: parsed(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
            min_connections: parsed(&lookup, "DATABASE_MIN_CONNECTIONS", 1)?,
            acquire_timeout_secs: parsed(&lookup, "DATABASE_ACQUIRE_TIMEOUT", 30)?,
            metrics_addr: parsed(&lookup, "METRICS_ADDR", SocketAddr::from(([0, 0, 0, 0], 9090)))?,
            sweep_interval_secs: parsed(&lookup, "SWEEP_INTERVAL_SECS", 60)?,
            refresh_estimates: parsed(&lookup, "REFRESH_ESTIMATES", true)?,
            queue: QueueConfig::default(),
        })
    }

    /// Tick interval; never shorter than one second.
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    /// Pool acquire timeout.
    #[must_use]
    pub const fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

fn parsed<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { name, value: raw }),
    }
}
