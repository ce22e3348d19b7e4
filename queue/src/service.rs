//! Command handlers: the imperative shell around [`QueueReducer`].
//!
//! Every command follows the same steps:
//!
//! ```text
//! load snapshot ──► reduce ──► commit (versions checked) ──► run effects
//!       ▲                            │
//!       └──── ConcurrentModification ┘  (retried per RetryPolicy)
//! ```
//!
//! Effects (event publication, notifications) run once, after the winning
//! commit. A rejected or conflicting attempt leaves no trace.

use crate::access::ensure_tenant;
use crate::actions::{NewTicket, QueueAction};
use crate::environment::QueueEnvironment;
use crate::error::{QueueError, Result};
use crate::eta;
use crate::providers::{HistoryLog, TicketRepository};
use crate::reducer::QueueReducer;
use crate::state::ProviderQueue;
use crate::status::TransitionKind;
use crate::types::{
    ActorContext, BookingChannel, Contact, CustomerId, HistoryEntry, ProviderId, QueueNumber,
    ServiceId, TenantId, Ticket, TicketId,
};
use chairline_core::effect::Effect;
use chairline_core::reducer::Reducer;
use chairline_runtime::EffectRunner;
use chairline_runtime::metrics::{COMMANDS_REJECTED, CONFLICTS, TICKETS_CREATED, TRANSITIONS, counter};
use chairline_runtime::retry::{RetryPolicy, retry_with_predicate};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::sync::Arc;

type Effects = SmallVec<[Effect<QueueAction>; 4]>;

/// Request to add a ticket to a provider's queue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTicket {
    /// Provider whose queue to join
    pub provider_id: ProviderId,
    /// Requested service
    pub service_id: ServiceId,
    /// Registered customer, if any
    pub customer_id: Option<CustomerId>,
    /// How to reach the holder
    pub contact: Contact,
    /// Entry channel; decides the initial status
    pub channel: BookingChannel,
    /// Time asked for; its UTC date picks the service-day (today otherwise)
    pub requested_time: Option<DateTime<Utc>>,
}

/// Queue command and query API.
pub struct QueueService<R> {
    repository: Arc<R>,
    reducer: QueueReducer,
    env: QueueEnvironment,
    retry: RetryPolicy,
}

impl<R> std::fmt::Debug for QueueService<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueService")
            .field("env", &self.env)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl<R> QueueService<R>
where
    R: TicketRepository + HistoryLog,
{
    /// Create a service. Conflicts are retried `config.conflict_retries` times.
    #[must_use]
    pub fn new(repository: Arc<R>, env: QueueEnvironment) -> Self {
        let retry = RetryPolicy::builder()
            .max_retries(env.config.conflict_retries)
            .build();
        Self {
            repository,
            reducer: QueueReducer::new(),
            env,
            retry,
        }
    }

    /// Replace the conflict retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The reducer environment.
    #[must_use]
    pub const fn environment(&self) -> &QueueEnvironment {
        &self.env
    }

    // ========== Shell plumbing ==========

    /// Reduce `action` and commit whatever it staged.
    async fn reduce_and_commit(&self, queue: &mut ProviderQueue, action: QueueAction) -> Result<Effects> {
        let effects = self.reducer.reduce(queue, action, &self.env);
        if let Some(error) = queue.last_error.take() {
            return Err(error);
        }

        if let Some(commit) = queue.take_commit() {
            let provider_id = commit.provider.id;
            match self.repository.commit(commit).await {
                Ok(rows) => {
                    tracing::debug!(%provider_id, rows = rows.len(), "Queue changes committed");
                },
                Err(error) => {
                    if error.is_retryable() {
                        counter!(CONFLICTS).increment(1);
                    }
                    return Err(error);
                },
            }
        }

        Ok(effects)
    }

    /// Run post-commit effects and feed their results back to the reducer.
    ///
    /// Feedback arrives after the commit, so it must neither stage changes
    /// nor ask for more effects; anything it does produce is dropped.
    async fn run_effects(&self, queue: &mut ProviderQueue, effects: Effects) {
        for action in EffectRunner::run(effects).await {
            let follow_up = self.reducer.reduce(queue, action, &self.env);
            let staged = queue.take_commit().is_some();
            if !follow_up.is_empty() || staged {
                tracing::error!(
                    effects = follow_up.len(),
                    staged,
                    "Post-commit feedback produced work that will not run"
                );
            }
            debug_assert!(follow_up.is_empty() && !staged, "post-commit feedback must be inert");
        }
    }

    fn observe<T>(command: &'static str, result: Result<T>) -> Result<T> {
        if let Err(error) = &result {
            counter!(COMMANDS_REJECTED, "command" => command, "reason" => error.reason()).increment(1);
            if error.is_retryable() {
                tracing::warn!(command, %error, "Command abandoned after conflicting retries");
            }
        }
        result
    }

    async fn load(&self, provider_id: ProviderId, service_day: NaiveDate) -> Result<ProviderQueue> {
        let snapshot = self.repository.load_queue(provider_id, service_day).await?;
        Ok(ProviderQueue::from_snapshot(snapshot))
    }

    // ========== Create ==========

    /// Add a ticket to the end of a provider's queue.
    ///
    /// Allocates the tenant/day queue number and the next position, sets the
    /// initial status from the channel, recalculates estimates, then
    /// publishes `TicketCreated` and sends the booking confirmation.
    ///
    /// # Errors
    ///
    /// - `NotFound` for an unknown provider or service
    /// - `CrossTenantAccess` if either belongs to another tenant
    /// - `ConcurrentModification` if conflicts outlast the retry budget
    /// - `Storage` on backend failure
    #[tracing::instrument(
        skip_all,
        name = "create_ticket",
        fields(tenant_id = %actor.tenant_id, provider_id = %command.provider_id)
    )]
    pub async fn create_ticket(&self, actor: &ActorContext, command: CreateTicket) -> Result<Ticket> {
        let result = self.create_ticket_inner(actor, command).await;
        Self::observe("create_ticket", result)
    }

    async fn create_ticket_inner(&self, actor: &ActorContext, command: CreateTicket) -> Result<Ticket> {
        let provider = self
            .repository
            .find_provider(command.provider_id)
            .await?
            .ok_or_else(|| QueueError::not_found("provider", command.provider_id))?;
        ensure_tenant(actor, provider.tenant_id, "provider", provider.id)?;

        let service = self
            .repository
            .find_service(command.service_id)
            .await?
            .ok_or_else(|| QueueError::not_found("service", command.service_id))?;
        ensure_tenant(actor, service.tenant_id, "service", service.id)?;

        let service_day = command
            .requested_time
            .unwrap_or_else(|| self.env.clock.now())
            .date_naive();
        let sequence = self
            .repository
            .next_queue_number(actor.tenant_id, service_day)
            .await?;
        let new_ticket = NewTicket {
            ticket_id: TicketId::new(),
            service,
            customer_id: command.customer_id,
            contact: command.contact,
            channel: command.channel,
            requested_time: command.requested_time,
            queue_number: QueueNumber::new(&self.env.config.queue_number_prefix, sequence),
        };
        let ticket_id = new_ticket.ticket_id;
        let provider_id = provider.id;

        let (mut queue, effects) = retry_with_predicate(
            self.retry.clone(),
            move || {
                let action = QueueAction::CreateTicket {
                    actor: actor.clone(),
                    ticket: new_ticket.clone(),
                };
                async move {
                    let mut queue = self.load(provider_id, service_day).await?;
                    let effects = self.reduce_and_commit(&mut queue, action).await?;
                    Ok((queue, effects))
                }
            },
            QueueError::is_retryable,
        )
        .await?;

        let ticket = queue
            .ticket(ticket_id)
            .cloned()
            .ok_or_else(|| QueueError::not_found("ticket", ticket_id))?;

        counter!(TICKETS_CREATED, "channel" => ticket.channel.as_str()).increment(1);
        tracing::info!(
            ticket_id = %ticket.id,
            provider_id = %ticket.provider_id,
            queue_number = %ticket.queue_number,
            position = ticket.position,
            channel = ticket.channel.as_str(),
            "Ticket created"
        );

        self.run_effects(&mut queue, effects).await;
        Ok(ticket)
    }

    // ========== Transitions ==========

    /// Move a ticket along its lifecycle.
    ///
    /// The tenant check runs before the state-machine check. Estimates of
    /// the provider's queue are recalculated in the same commit.
    ///
    /// # Errors
    ///
    /// - `NotFound` for an unknown ticket
    /// - `CrossTenantAccess` if it belongs to another tenant
    /// - `InvalidTransition` if the lifecycle forbids the move
    /// - `ProviderBusy` when starting while another ticket is in service
    /// - `ConcurrentModification` if conflicts outlast the retry budget
    /// - `Storage` on backend failure
    #[tracing::instrument(
        skip_all,
        name = "transition",
        fields(%ticket_id, ?kind, tenant_id = %actor.tenant_id)
    )]
    pub async fn transition(
        &self,
        ticket_id: TicketId,
        kind: TransitionKind,
        actor: &ActorContext,
        note: Option<String>,
    ) -> Result<Ticket> {
        let result = self.transition_inner(ticket_id, kind, actor, note).await;
        Self::observe("transition", result)
    }

    async fn transition_inner(
        &self,
        ticket_id: TicketId,
        kind: TransitionKind,
        actor: &ActorContext,
        note: Option<String>,
    ) -> Result<Ticket> {
        let target = kind.target();

        let (mut queue, effects) = retry_with_predicate(
            self.retry.clone(),
            move || {
                let action = QueueAction::transition(actor.clone(), ticket_id, target, note.clone());
                async move {
                    let ticket = self
                        .repository
                        .find_ticket(ticket_id)
                        .await?
                        .ok_or_else(|| QueueError::not_found("ticket", ticket_id))?;
                    ensure_tenant(actor, ticket.tenant_id, "ticket", ticket_id)?;

                    let mut queue = self.load(ticket.provider_id, ticket.service_day).await?;
                    queue.include(ticket);
                    let effects = self.reduce_and_commit(&mut queue, action).await?;
                    Ok((queue, effects))
                }
            },
            QueueError::is_retryable,
        )
        .await?;

        let ticket = queue
            .ticket(ticket_id)
            .cloned()
            .ok_or_else(|| QueueError::not_found("ticket", ticket_id))?;
        counter!(TRANSITIONS, "to" => target.as_str()).increment(1);

        self.run_effects(&mut queue, effects).await;
        Ok(ticket)
    }

    /// `BOOKED -> CHECKED_IN`.
    ///
    /// # Errors
    ///
    /// See [`transition`](Self::transition).
    pub async fn check_in(&self, ticket_id: TicketId, actor: &ActorContext) -> Result<Ticket> {
        self.transition(ticket_id, TransitionKind::CheckIn, actor, None).await
    }

    /// `CHECKED_IN -> IN_SERVICE`; the provider becomes busy.
    ///
    /// # Errors
    ///
    /// See [`transition`](Self::transition).
    pub async fn start_service(&self, ticket_id: TicketId, actor: &ActorContext) -> Result<Ticket> {
        self.transition(ticket_id, TransitionKind::Start, actor, None).await
    }

    /// `IN_SERVICE -> DONE`; the provider becomes available.
    ///
    /// # Errors
    ///
    /// See [`transition`](Self::transition).
    pub async fn complete(&self, ticket_id: TicketId, actor: &ActorContext) -> Result<Ticket> {
        self.transition(ticket_id, TransitionKind::Complete, actor, None).await
    }

    /// `BOOKED | CHECKED_IN -> NO_SHOW`.
    ///
    /// # Errors
    ///
    /// See [`transition`](Self::transition).
    pub async fn mark_no_show(&self, ticket_id: TicketId, actor: &ActorContext) -> Result<Ticket> {
        self.transition(ticket_id, TransitionKind::NoShow, actor, None).await
    }

    /// `BOOKED | CHECKED_IN -> CANCELED`, recording `reason`.
    ///
    /// # Errors
    ///
    /// See [`transition`](Self::transition).
    pub async fn cancel_ticket(
        &self,
        ticket_id: TicketId,
        actor: &ActorContext,
        reason: Option<String>,
    ) -> Result<Ticket> {
        self.transition(ticket_id, TransitionKind::Cancel, actor, reason)
            .await
    }

    // ========== Queries ==========

    /// Active tickets of a provider's day, in position order.
    ///
    /// # Errors
    ///
    /// `NotFound`, `CrossTenantAccess` or `Storage`.
    pub async fn provider_queue_snapshot(
        &self,
        provider_id: ProviderId,
        service_day: NaiveDate,
        actor: &ActorContext,
    ) -> Result<Vec<Ticket>> {
        let provider = self
            .repository
            .find_provider(provider_id)
            .await?
            .ok_or_else(|| QueueError::not_found("provider", provider_id))?;
        ensure_tenant(actor, provider.tenant_id, "provider", provider_id)?;

        let queue = self.load(provider_id, service_day).await?;
        Ok(queue.active_tickets())
    }

    /// Status history of a ticket, oldest first.
    ///
    /// # Errors
    ///
    /// `NotFound`, `CrossTenantAccess` or `Storage`.
    pub async fn ticket_history(&self, ticket_id: TicketId, actor: &ActorContext) -> Result<Vec<HistoryEntry>> {
        let ticket = self
            .repository
            .find_ticket(ticket_id)
            .await?
            .ok_or_else(|| QueueError::not_found("ticket", ticket_id))?;
        ensure_tenant(actor, ticket.tenant_id, "ticket", ticket_id)?;

        self.repository.entries_for(ticket_id).await
    }

    // ========== Estimates ==========

    /// Recalculate estimates for a provider's day and persist the changes.
    ///
    /// Returns the active tickets afterwards.
    ///
    /// # Errors
    ///
    /// `NotFound`, `CrossTenantAccess`, `ConcurrentModification` or `Storage`.
    #[tracing::instrument(skip_all, name = "recalculate", fields(%provider_id, %service_day))]
    pub async fn recalculate(
        &self,
        provider_id: ProviderId,
        service_day: NaiveDate,
        actor: &ActorContext,
    ) -> Result<Vec<Ticket>> {
        let result = self.recalculate_inner(provider_id, service_day, actor).await;
        Self::observe("recalculate", result)
    }

    async fn recalculate_inner(
        &self,
        provider_id: ProviderId,
        service_day: NaiveDate,
        actor: &ActorContext,
    ) -> Result<Vec<Ticket>> {
        let provider = self
            .repository
            .find_provider(provider_id)
            .await?
            .ok_or_else(|| QueueError::not_found("provider", provider_id))?;
        ensure_tenant(actor, provider.tenant_id, "provider", provider_id)?;

        let (mut queue, effects) = retry_with_predicate(
            self.retry.clone(),
            move || {
                let action = QueueAction::Recalculate {
                    actor: actor.clone(),
                };
                async move {
                    let mut queue = self.load(provider_id, service_day).await?;
                    let effects = self.reduce_and_commit(&mut queue, action).await?;
                    Ok((queue, effects))
                }
            },
            QueueError::is_retryable,
        )
        .await?;

        let tickets = queue.active_tickets();
        self.run_effects(&mut queue, effects).await;
        Ok(tickets)
    }

    /// Recalculate every queue on `service_days` whose estimates have fallen
    /// behind the clock. Failures are logged per queue and skipped.
    ///
    /// Returns the number of queues recalculated.
    ///
    /// # Errors
    ///
    /// Returns a storage error if active tickets cannot be listed.
    #[tracing::instrument(skip_all, name = "refresh_estimates")]
    pub async fn refresh_estimates(&self, service_days: &[NaiveDate]) -> Result<usize> {
        let now = self.env.clock.now();
        let tickets = self.repository.active_tickets(service_days).await?;

        let mut queues: BTreeMap<(ProviderId, NaiveDate), (TenantId, Vec<Ticket>)> = BTreeMap::new();
        for ticket in tickets {
            queues
                .entry((ticket.provider_id, ticket.service_day))
                .or_insert_with(|| (ticket.tenant_id, Vec::new()))
                .1
                .push(ticket);
        }

        let mut refreshed = 0;
        for ((provider_id, service_day), (tenant_id, tickets)) in queues {
            if !eta::is_stale(&tickets, now) {
                continue;
            }
            let actor = ActorContext::system(tenant_id);
            match self.recalculate(provider_id, service_day, &actor).await {
                Ok(_) => refreshed += 1,
                Err(error) => {
                    tracing::warn!(%provider_id, %service_day, %error, "Estimate refresh failed");
                },
            }
        }

        Ok(refreshed)
    }
}
