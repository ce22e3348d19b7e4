//! Queue reducer.
//!
//! Pure decision logic for one provider's queue: creation, lifecycle
//! transitions, provider availability and estimate refresh. All I/O is
//! described as effects and runs only after the shell has committed the
//! staged changes.
//!
//! A rejected command sets `state.last_error`, stages nothing and returns
//! no effects.

use crate::access::ensure_tenant;
use crate::actions::{NewTicket, QueueAction};
use crate::environment::QueueEnvironment;
use crate::error::QueueError;
use crate::eta;
use crate::events::TicketEvent;
use crate::state::ProviderQueue;
use crate::status::TicketStatus;
use crate::types::{
    ActorContext, HistoryEntry, ProviderStatus, ReminderKind, Ticket, TicketId,
};
use chairline_core::effect::Effect;
use chairline_core::reducer::Reducer;
use chairline_runtime::metrics::{RECALCULATION_DURATION, histogram};
use chrono::{DateTime, Utc};
use smallvec::{SmallVec, smallvec};
use std::sync::Arc;
use std::time::Instant;

type Effects = SmallVec<[Effect<QueueAction>; 4]>;

/// Reducer for [`ProviderQueue`].
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueReducer;

impl QueueReducer {
    /// Create a new reducer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn reject(state: &mut ProviderQueue, error: QueueError) -> Effects {
        tracing::debug!(reason = error.reason(), %error, "Queue command rejected");
        state.last_error = Some(error);
        SmallVec::new()
    }

    /// Recompute estimates, staging every ticket whose estimate moved.
    ///
    /// Waiting tickets never start before their service-day opens, so a
    /// booking for a later day is not scheduled against today's clock.
    fn refresh_estimates(state: &mut ProviderQueue, now: DateTime<Utc>, env: &QueueEnvironment) -> Vec<TicketId> {
        let started = Instant::now();
        let earliest = now.max(env.config.opens_at(state.service_day));
        let changed = eta::recalculate(&mut state.tickets, earliest, env.config.buffer());
        for id in &changed {
            state.stage_update(*id);
        }
        histogram!(RECALCULATION_DURATION).record(started.elapsed().as_secs_f64());
        changed
    }

    /// Derive the provider's availability from the transition just applied.
    ///
    /// Returns `true` if the status changed.
    fn settle_provider(state: &mut ProviderQueue, target: TicketStatus) -> bool {
        let next = match target {
            TicketStatus::InService => Some(ProviderStatus::Busy),
            TicketStatus::Done => Some(ProviderStatus::Available),
            TicketStatus::Canceled | TicketStatus::NoShow
                if state.provider.status == ProviderStatus::Busy && state.in_service().is_none() =>
            {
                Some(ProviderStatus::Available)
            },
            _ => None,
        };

        match next {
            Some(status) if status != state.provider.status => {
                state.provider.status = status;
                true
            },
            _ => false,
        }
    }

    /// `TicketUpdated` for every recalculated ticket except `skip`.
    fn estimate_events(state: &ProviderQueue, changed: &[TicketId], skip: TicketId) -> Vec<TicketEvent> {
        changed
            .iter()
            .filter(|id| **id != skip)
            .filter_map(|id| state.ticket(*id))
            .map(|ticket| TicketEvent::TicketUpdated {
                ticket: ticket.clone(),
            })
            .collect()
    }

    fn publish(env: &QueueEnvironment, events: Vec<TicketEvent>) -> Effect<QueueAction> {
        if events.is_empty() {
            return Effect::None;
        }
        let sink = Arc::clone(&env.events);
        Effect::Future(Box::pin(async move {
            for event in events {
                let event_type = event.event_type();
                if let Err(error) = sink.publish(event).await {
                    tracing::warn!(event_type, %error, "Failed to publish queue event");
                }
            }
            None
        }))
    }

    fn notify(env: &QueueEnvironment, ticket: Ticket, kind: ReminderKind) -> Effect<QueueAction> {
        let dispatcher = Arc::clone(&env.notifications);
        Effect::Future(Box::pin(async move {
            let outcome = match dispatcher.dispatch(&ticket, kind).await {
                Ok(outcome) => Some(outcome),
                Err(error) => {
                    tracing::warn!(ticket_id = %ticket.id, %kind, %error, "Notification dispatch failed");
                    None
                },
            };
            Some(QueueAction::NotificationDispatched {
                ticket_id: ticket.id,
                kind,
                outcome,
            })
        }))
    }

    // ========== Create ==========

    fn create(
        state: &mut ProviderQueue,
        actor: &ActorContext,
        new: NewTicket,
        env: &QueueEnvironment,
    ) -> Effects {
        if let Err(error) = ensure_tenant(actor, state.provider.tenant_id, "provider", state.provider.id)
            .and_then(|()| ensure_tenant(actor, new.service.tenant_id, "service", new.service.id))
        {
            return Self::reject(state, error);
        }

        let now = env.clock.now();
        let status = new.channel.initial_status();
        let ticket = Ticket {
            id: new.ticket_id,
            tenant_id: actor.tenant_id,
            provider_id: state.provider.id,
            service_id: new.service.id,
            customer_id: new.customer_id,
            contact: new.contact,
            channel: new.channel,
            status,
            queue_number: new.queue_number,
            service_day: state.service_day,
            position: state.next_position(),
            estimated_duration_minutes: new.service.duration_minutes,
            requested_time: new.requested_time,
            estimated_start: None,
            estimated_end: None,
            actual_start: None,
            actual_end: None,
            cancellation_reason: None,
            version: 1,
            created_at: now,
            updated_at: now,
        };
        let ticket_id = ticket.id;

        state.insert(ticket);
        state.record(HistoryEntry {
            ticket_id,
            status,
            actor: actor.reference(),
            note: Some(format!("created via {}", new.channel.as_str())),
            recorded_at: now,
        });

        let changed = Self::refresh_estimates(state, now, env);

        let Some(created) = state.ticket(ticket_id).cloned() else {
            return Self::reject(state, QueueError::not_found("ticket", ticket_id));
        };
        let mut events = vec![TicketEvent::TicketCreated {
            ticket: created.clone(),
        }];
        events.extend(Self::estimate_events(state, &changed, ticket_id));

        smallvec![Effect::merge(vec![
            Self::publish(env, events),
            Self::notify(env, created, ReminderKind::BookingConfirmed),
        ])]
    }

    // ========== Transition ==========

    fn transition(
        state: &mut ProviderQueue,
        actor: &ActorContext,
        ticket_id: TicketId,
        target: TicketStatus,
        note: Option<String>,
        env: &QueueEnvironment,
    ) -> Effects {
        let Some(ticket) = state.ticket(ticket_id) else {
            return Self::reject(state, QueueError::not_found("ticket", ticket_id));
        };

        if let Err(error) = ensure_tenant(actor, ticket.tenant_id, "ticket", ticket_id) {
            return Self::reject(state, error);
        }

        let from = ticket.status;
        if let Err(error) = from.transition_to(target) {
            return Self::reject(state, error);
        }

        if target == TicketStatus::InService {
            if let Some(serving) = state.in_service() {
                let error = QueueError::ProviderBusy {
                    provider_id: state.provider.id,
                    ticket_id: serving.id,
                };
                return Self::reject(state, error);
            }
        }

        let now = env.clock.now();
        if let Some(ticket) = state.ticket_mut(ticket_id) {
            ticket.status = target;
            ticket.updated_at = now;
            match target {
                TicketStatus::InService => {
                    ticket.actual_start = Some(now);
                    ticket.set_estimate(now);
                },
                TicketStatus::Done => {
                    let started = ticket.actual_start.unwrap_or(now);
                    ticket.actual_end = Some(now.max(started));
                },
                TicketStatus::Canceled => {
                    ticket.cancellation_reason.clone_from(&note);
                },
                _ => {},
            }
        }
        state.stage_update(ticket_id);
        state.record(HistoryEntry {
            ticket_id,
            status: target,
            actor: actor.reference(),
            note,
            recorded_at: now,
        });

        let provider_changed = Self::settle_provider(state, target);
        let changed = Self::refresh_estimates(state, now, env);

        let Some(moved) = state.ticket(ticket_id).cloned() else {
            return Self::reject(state, QueueError::not_found("ticket", ticket_id));
        };

        tracing::info!(
            ticket_id = %ticket_id,
            provider_id = %state.provider.id,
            from = %from,
            to = %target,
            recalculated = changed.len(),
            "Ticket transitioned"
        );

        let mut events = vec![if target == TicketStatus::Canceled {
            TicketEvent::TicketCancelled {
                ticket: moved.clone(),
            }
        } else {
            TicketEvent::TicketUpdated {
                ticket: moved.clone(),
            }
        }];
        events.extend(Self::estimate_events(state, &changed, ticket_id));
        if provider_changed {
            events.push(TicketEvent::provider_status(&state.provider));
        }

        let publish = Self::publish(env, events);
        let notice = match target {
            TicketStatus::InService => Some(ReminderKind::YourTurn),
            TicketStatus::Done => Some(ReminderKind::ThankYou),
            _ => None,
        };
        match notice {
            Some(kind) => smallvec![Effect::merge(vec![publish, Self::notify(env, moved, kind)])],
            None => smallvec![publish],
        }
    }

    // ========== Recalculate ==========

    fn recalculate(state: &mut ProviderQueue, actor: &ActorContext, env: &QueueEnvironment) -> Effects {
        if let Err(error) = ensure_tenant(actor, state.provider.tenant_id, "provider", state.provider.id) {
            return Self::reject(state, error);
        }

        let now = env.clock.now();
        let changed = Self::refresh_estimates(state, now, env);
        if changed.is_empty() {
            return SmallVec::new();
        }

        tracing::debug!(
            provider_id = %state.provider.id,
            changed = changed.len(),
            "Estimates refreshed"
        );
        let events = changed
            .iter()
            .filter_map(|id| state.ticket(*id))
            .map(|ticket| TicketEvent::TicketUpdated {
                ticket: ticket.clone(),
            })
            .collect();
        smallvec![Self::publish(env, events)]
    }
}

impl Reducer for QueueReducer {
    type State = ProviderQueue;
    type Action = QueueAction;
    type Environment = QueueEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            QueueAction::CreateTicket { actor, ticket } => {
                state.last_error = None;
                Self::create(state, &actor, ticket, env)
            },
            QueueAction::Transition {
                actor,
                ticket_id,
                target,
                note,
            } => {
                state.last_error = None;
                Self::transition(state, &actor, ticket_id, target, note, env)
            },
            QueueAction::Recalculate { actor } => {
                state.last_error = None;
                Self::recalculate(state, &actor, env)
            },
            QueueAction::NotificationDispatched {
                ticket_id,
                kind,
                outcome,
            } => {
                tracing::debug!(%ticket_id, %kind, ?outcome, "Notification effect finished");
                SmallVec::new()
            },
        }
    }
}
