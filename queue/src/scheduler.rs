//! Periodic reminder sweep.
//!
//! A sweep looks at every active ticket for the days around `now`, decides
//! which reminders are due, and hands each one to the
//! [`NotificationDispatcher`]. The sweep keeps no state of its own: whether a
//! reminder was already delivered lives in the notification log, so sweeps
//! may overlap, repeat, or run in several processes without double-sending.
//!
//! Thresholds:
//!
//! - **T-30 / T-15**: a waiting ticket whose estimated start falls within
//!   `lead ± window` of `now`
//! - **Next in line**: per provider and day, the first waiting ticket behind
//!   the one in service

use crate::config::ReminderConfig;
use crate::error::Result;
use crate::notify::{DispatchOutcome, NotificationDispatcher};
use crate::providers::TicketRepository;
use crate::status::TicketStatus;
use crate::types::{ProviderId, ReminderKind, Ticket};
use chairline_core::environment::Clock;
use chairline_runtime::metrics::{SWEEP_DURATION, histogram};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// A reminder that should go out now.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DueReminder {
    /// Ticket to remind
    pub ticket: Ticket,
    /// Which reminder
    pub kind: ReminderKind,
}

/// Summary of one sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Active tickets looked at
    pub examined: usize,
    /// Reminders found due
    pub due: usize,
    /// Delivered during this sweep
    pub sent: usize,
    /// Attempted and failed during this sweep
    pub failed: usize,
    /// Due but skipped (already sent, in flight, no contact, given up)
    pub skipped: usize,
    /// Dispatches that hit a storage error
    pub errors: usize,
}

impl SweepReport {
    fn absorb(&mut self, outcome: &Result<DispatchOutcome>) {
        match outcome {
            Ok(DispatchOutcome::Sent) => self.sent += 1,
            Ok(DispatchOutcome::Failed) => self.failed += 1,
            Ok(_) => self.skipped += 1,
            Err(_) => self.errors += 1,
        }
    }
}

/// Service days a sweep at `now` covers: yesterday, today and tomorrow (UTC).
///
/// Covers queues that straddle midnight and reminders for early tickets of
/// the next day.
#[must_use]
pub fn sweep_days(now: DateTime<Utc>) -> [NaiveDate; 3] {
    let today = now.date_naive();
    [
        today.pred_opt().unwrap_or(today),
        today,
        today.succ_opt().unwrap_or(today),
    ]
}

fn within(start: DateTime<Utc>, target: DateTime<Utc>, window: Duration) -> bool {
    start >= target - window && start <= target + window
}

/// Decide which reminders are due at `now`.
///
/// Tickets without a reachable address are never due.
#[must_use]
pub fn due_reminders(tickets: &[Ticket], now: DateTime<Utc>, config: &ReminderConfig) -> Vec<DueReminder> {
    let reachable = || {
        tickets
            .iter()
            .filter(|t| t.is_waiting() && t.contact_address().is_some())
    };
    let mut due = Vec::new();

    for (kind, lead) in [
        (ReminderKind::ThirtyMinutes, config.first_lead()),
        (ReminderKind::FifteenMinutes, config.second_lead()),
    ] {
        let target = now + lead;
        due.extend(
            reachable()
                .filter(|t| t.estimated_start.is_some_and(|start| within(start, target, config.window())))
                .map(|t| DueReminder {
                    ticket: t.clone(),
                    kind,
                }),
        );
    }

    if config.next_in_line_enabled {
        let mut queues: BTreeMap<(ProviderId, NaiveDate), Vec<&Ticket>> = BTreeMap::new();
        for ticket in tickets {
            queues
                .entry((ticket.provider_id, ticket.service_day))
                .or_default()
                .push(ticket);
        }

        for queue in queues.values() {
            let Some(serving) = queue.iter().find(|t| t.status == TicketStatus::InService) else {
                continue;
            };
            let next = queue
                .iter()
                .filter(|t| t.is_waiting() && t.position > serving.position)
                .min_by_key(|t| t.position);
            if let Some(next) = next.filter(|t| t.contact_address().is_some()) {
                due.push(DueReminder {
                    ticket: (*next).clone(),
                    kind: ReminderKind::NextInLine,
                });
            }
        }
    }

    due
}

/// Stateless reminder sweep over a ticket repository.
pub struct ReminderScheduler<R> {
    repository: Arc<R>,
    dispatcher: Arc<NotificationDispatcher>,
    clock: Arc<dyn Clock>,
    config: ReminderConfig,
}

impl<R> std::fmt::Debug for ReminderScheduler<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReminderScheduler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<R: TicketRepository> ReminderScheduler<R> {
    /// Create a scheduler.
    #[must_use]
    pub fn new(
        repository: Arc<R>,
        dispatcher: Arc<NotificationDispatcher>,
        clock: Arc<dyn Clock>,
        config: ReminderConfig,
    ) -> Self {
        Self {
            repository,
            dispatcher,
            clock,
            config,
        }
    }

    /// Sweep at the clock's current time.
    ///
    /// # Errors
    ///
    /// Returns a storage error if active tickets cannot be loaded.
    pub async fn sweep(&self) -> Result<SweepReport> {
        self.sweep_at(self.clock.now()).await
    }

    /// Sweep as of `now`.
    ///
    /// Individual dispatch failures are counted in the report and never
    /// abort the sweep.
    ///
    /// # Errors
    ///
    /// Returns a storage error if active tickets cannot be loaded.
    #[tracing::instrument(skip_all, name = "reminder_sweep", fields(%now))]
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let started = Instant::now();
        let tickets = self.repository.active_tickets(&sweep_days(now)).await?;
        let due = due_reminders(&tickets, now, &self.config);

        let mut report = SweepReport {
            examined: tickets.len(),
            due: due.len(),
            ..SweepReport::default()
        };

        for reminder in due {
            let outcome = self.dispatcher.dispatch(&reminder.ticket, reminder.kind).await;
            if let Err(error) = &outcome {
                tracing::error!(
                    ticket_id = %reminder.ticket.id,
                    kind = %reminder.kind,
                    %error,
                    "Reminder dispatch failed"
                );
            }
            report.absorb(&outcome);
        }

        histogram!(SWEEP_DURATION).record(started.elapsed().as_secs_f64());
        if report.due > 0 {
            tracing::info!(
                examined = report.examined,
                due = report.due,
                sent = report.sent,
                failed = report.failed,
                skipped = report.skipped,
                errors = report.errors,
                "Reminder sweep finished"
            );
        }
        Ok(report)
    }

    /// Sweep every `interval` until `shutdown` turns `true`.
    pub async fn run(&self, interval: std::time::Duration, shutdown: watch::Receiver<bool>) {
        self.run_with(interval, shutdown, |_| async {}).await;
    }

    /// Like [`run`](Self::run), awaiting `before_sweep(now)` at the start of
    /// every tick (the host uses it to refresh estimates).
    ///
    /// Missed ticks are skipped rather than bursted.
    pub async fn run_with<F, Fut>(
        &self,
        interval: std::time::Duration,
        mut shutdown: watch::Receiver<bool>,
        mut before_sweep: F,
    ) where
        F: FnMut(DateTime<Utc>) -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(interval_ms = interval.as_millis(), "Reminder scheduler started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = self.clock.now();
                    before_sweep(now).await;
                    if let Err(error) = self.sweep_at(now).await {
                        tracing::error!(%error, "Reminder sweep failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Reminder scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BookingChannel, Contact, QueueNumber, ServiceId, TenantId, TicketId};
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, hour, minute, 0)
            .single()
            .unwrap_or_default()
    }

    fn ticket(provider: ProviderId, position: u32, status: TicketStatus, start: DateTime<Utc>) -> Ticket {
        Ticket {
            id: TicketId::new(),
            tenant_id: TenantId::new(),
            provider_id: provider,
            service_id: ServiceId::new(),
            customer_id: None,
            contact: Contact::new("Dana", format!("+1555010{position}")),
            channel: BookingChannel::Online,
            status,
            queue_number: QueueNumber::new("A", position),
            service_day: start.date_naive(),
            position,
            estimated_duration_minutes: 30,
            requested_time: None,
            estimated_start: Some(start),
            estimated_end: Some(start + Duration::minutes(30)),
            actual_start: None,
            actual_end: None,
            cancellation_reason: None,
            version: 1,
            created_at: start,
            updated_at: start,
        }
    }

    fn kinds(due: &[DueReminder]) -> Vec<(u32, ReminderKind)> {
        due.iter().map(|d| (d.ticket.position, d.kind)).collect()
    }

    #[test]
    fn thresholds_match_inside_the_window_only() {
        let provider = ProviderId::new();
        let now = at(9, 0);
        let tickets = vec![
            ticket(provider, 1, TicketStatus::Booked, at(9, 31)),
            ticket(provider, 2, TicketStatus::Booked, at(9, 15)),
            ticket(provider, 3, TicketStatus::Booked, at(9, 45)),
        ];

        let due = due_reminders(&tickets, now, &ReminderConfig::default());

        assert_eq!(
            kinds(&due),
            vec![(1, ReminderKind::ThirtyMinutes), (2, ReminderKind::FifteenMinutes)]
        );
    }

    #[test]
    fn next_in_line_is_first_waiting_behind_service() {
        let provider = ProviderId::new();
        let now = at(9, 0);
        let tickets = vec![
            ticket(provider, 1, TicketStatus::InService, at(8, 50)),
            ticket(provider, 2, TicketStatus::Canceled, at(9, 25)),
            ticket(provider, 3, TicketStatus::CheckedIn, at(10, 5)),
            ticket(provider, 4, TicketStatus::Booked, at(10, 40)),
        ];

        let due = due_reminders(&tickets, now, &ReminderConfig::default());

        assert_eq!(kinds(&due), vec![(3, ReminderKind::NextInLine)]);
    }

    #[test]
    fn next_in_line_can_be_disabled() {
        let provider = ProviderId::new();
        let tickets = vec![
            ticket(provider, 1, TicketStatus::InService, at(8, 50)),
            ticket(provider, 2, TicketStatus::CheckedIn, at(10, 5)),
        ];
        let config = ReminderConfig {
            next_in_line_enabled: false,
            ..ReminderConfig::default()
        };

        assert!(due_reminders(&tickets, at(9, 0), &config).is_empty());
    }

    #[test]
    fn unreachable_tickets_are_never_due() {
        let provider = ProviderId::new();
        let mut silent = ticket(provider, 1, TicketStatus::Booked, at(9, 30));
        silent.contact = Contact::default();

        assert!(due_reminders(&[silent], at(9, 0), &ReminderConfig::default()).is_empty());
    }

    #[test]
    fn sweep_covers_three_days() {
        let days = sweep_days(at(0, 5));
        assert_eq!(days[1], at(0, 5).date_naive());
        assert_eq!(days[0].succ_opt(), Some(days[1]));
        assert_eq!(days[1].succ_opt(), Some(days[2]));
    }

    #[test]
    fn report_counts_outcomes() {
        let mut report = SweepReport::default();
        report.absorb(&Ok(DispatchOutcome::Sent));
        report.absorb(&Ok(DispatchOutcome::AlreadySent));
        report.absorb(&Ok(DispatchOutcome::Failed));
        report.absorb(&Err(crate::error::QueueError::Storage("down".into())));
        assert_eq!((report.sent, report.failed, report.skipped, report.errors), (1, 1, 1, 1));
    }
}
