//! Queue engine configuration.
//!
//! Loaded from environment variables with defaults matching a typical
//! walk-in barbershop.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::env;

/// Tunables for estimation, reminders and conflict handling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Turnover gap between consecutive customers, in minutes (default: 5)
    pub buffer_minutes: u32,
    /// Prefix for queue numbers (default: `A`)
    pub queue_number_prefix: String,
    /// Hour (UTC, 0-23) the shop opens; no estimate starts earlier on its service-day (default: 0)
    pub opening_hour: u32,
    /// Whole-command retries after an optimistic-lock conflict (default: 1)
    pub conflict_retries: usize,
    /// Reminder settings
    pub reminders: ReminderConfig,
}

/// Reminder sweep and delivery settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderConfig {
    /// Lead time of the first reminder, in minutes (default: 30)
    pub first_lead_minutes: u32,
    /// Lead time of the second reminder, in minutes (default: 15)
    pub second_lead_minutes: u32,
    /// Half-width of the match window around each lead time, in minutes (default: 1)
    pub window_minutes: u32,
    /// Send "you're next" to the ticket behind the one in service (default: true)
    pub next_in_line_enabled: bool,
    /// Failed attempts after which a reminder is given up (default: 3)
    pub max_delivery_attempts: u32,
    /// Age after which an unfinished delivery claim may be taken over, in seconds (default: 120)
    pub claim_timeout_secs: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            buffer_minutes: 5,
            queue_number_prefix: "A".to_string(),
            opening_hour: 0,
            conflict_retries: 1,
            reminders: ReminderConfig::default(),
        }
    }
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            first_lead_minutes: 30,
            second_lead_minutes: 15,
            window_minutes: 1,
            next_in_line_enabled: true,
            max_delivery_attempts: 3,
            claim_timeout_secs: 120,
        }
    }
}

impl QueueConfig {
    /// Load configuration from `QUEUE_*` and `REMINDER_*` environment
    /// variables, falling back to defaults for anything unset or unparsable.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let reminder_defaults = ReminderConfig::default();

        Self {
            buffer_minutes: parse_var("QUEUE_BUFFER_MINUTES").unwrap_or(defaults.buffer_minutes),
            queue_number_prefix: env::var("QUEUE_NUMBER_PREFIX")
                .ok()
                .filter(|prefix| !prefix.trim().is_empty())
                .unwrap_or(defaults.queue_number_prefix),
            opening_hour: parse_var("QUEUE_OPENING_HOUR")
                .filter(|hour| *hour < 24)
                .unwrap_or(defaults.opening_hour),
            conflict_retries: parse_var("QUEUE_CONFLICT_RETRIES")
                .unwrap_or(defaults.conflict_retries),
            reminders: ReminderConfig {
                first_lead_minutes: parse_var("REMINDER_FIRST_LEAD_MINUTES")
                    .unwrap_or(reminder_defaults.first_lead_minutes),
                second_lead_minutes: parse_var("REMINDER_SECOND_LEAD_MINUTES")
                    .unwrap_or(reminder_defaults.second_lead_minutes),
                window_minutes: parse_var("REMINDER_WINDOW_MINUTES")
                    .unwrap_or(reminder_defaults.window_minutes),
                next_in_line_enabled: parse_var("REMINDER_NEXT_IN_LINE")
                    .unwrap_or(reminder_defaults.next_in_line_enabled),
                max_delivery_attempts: parse_var("REMINDER_MAX_ATTEMPTS")
                    .unwrap_or(reminder_defaults.max_delivery_attempts),
                claim_timeout_secs: parse_var("REMINDER_CLAIM_TIMEOUT_SECS")
                    .unwrap_or(reminder_defaults.claim_timeout_secs),
            },
        }
    }

    /// Buffer as a duration.
    #[must_use]
    pub fn buffer(&self) -> Duration {
        Duration::minutes(i64::from(self.buffer_minutes))
    }

    /// When `service_day` opens. Hours past 23 are treated as 23.
    #[must_use]
    pub fn opens_at(&self, service_day: NaiveDate) -> DateTime<Utc> {
        let time = NaiveTime::from_hms_opt(self.opening_hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
        service_day.and_time(time).and_utc()
    }
}

impl ReminderConfig {
    /// First reminder lead as a duration.
    #[must_use]
    pub fn first_lead(&self) -> Duration {
        Duration::minutes(i64::from(self.first_lead_minutes))
    }

    /// Second reminder lead as a duration.
    #[must_use]
    pub fn second_lead(&self) -> Duration {
        Duration::minutes(i64::from(self.second_lead_minutes))
    }

    /// Match window half-width as a duration.
    #[must_use]
    pub fn window(&self) -> Duration {
        Duration::minutes(i64::from(self.window_minutes))
    }

    /// Claim timeout as a duration.
    #[must_use]
    pub fn claim_timeout(&self) -> Duration {
        Duration::seconds(i64::from(self.claim_timeout_secs))
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|value| value.trim().parse().ok())
}
