//! # Chairline Runtime
//!
//! Imperative-shell support for the queue engine:
//!
//! - [`EffectRunner`]: executes the effect descriptions a reducer returned,
//!   once the command that produced them has been committed
//! - [`retry`]: re-runs a whole command after an optimistic-lock conflict
//! - [`metrics`]: metric names, descriptions and the Prometheus exporter

use chairline_core::effect::Effect;
use futures::future::{BoxFuture, join_all};

pub mod metrics;
pub mod retry;

/// Executes effect trees to completion.
///
/// Unlike a long-lived store, the queue engine runs effects once per command,
/// after its unit of work is durable. Every effect is awaited, and actions fed
/// back by `Future` effects are collected and returned to the caller in
/// declaration order.
#[derive(Debug, Clone, Copy, Default)]
pub struct EffectRunner;

impl EffectRunner {
    /// Run all effects, returning the actions they produced.
    ///
    /// Top-level effects run sequentially, matching the order the reducer
    /// emitted them in.
    pub async fn run<A, I>(effects: I) -> Vec<A>
    where
        A: Send + 'static,
        I: IntoIterator<Item = Effect<A>>,
    {
        let mut produced = Vec::new();
        for effect in effects {
            produced.extend(Self::run_one(effect).await);
        }
        produced
    }

    fn run_one<A>(effect: Effect<A>) -> BoxFuture<'static, Vec<A>>
    where
        A: Send + 'static,
    {
        Box::pin(async move {
            match effect {
                Effect::None => {
                    tracing::trace!("Executing Effect::None (no-op)");
                    Vec::new()
                },
                Effect::Future(fut) => {
                    tracing::trace!("Executing Effect::Future");
                    fut.await.into_iter().collect()
                },
                Effect::Parallel(effects) => {
                    tracing::trace!("Executing Effect::Parallel with {} effects", effects.len());
                    join_all(effects.into_iter().map(Self::run_one))
                        .await
                        .into_iter()
                        .flatten()
                        .collect()
                },
            }
        })
    }
}
