//! Message sender that records deliveries and fails on demand.

use crate::error::DeliveryError;
use crate::providers::MessageSender;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

/// A message handed to the sender.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentMessage {
    /// Address
    pub recipient: String,
    /// Rendered text
    pub body: String,
    /// Whether the simulated gateway accepted it
    pub delivered: bool,
}

#[derive(Debug, Default)]
struct Script {
    attempts: Vec<SentMessage>,
    fail_next: u32,
    offline: bool,
}

/// Simulated gateway.
///
/// Succeeds by default. [`fail_next`](Self::fail_next) rejects the next N
/// sends; [`set_offline`](Self::set_offline) rejects everything until reset.
#[derive(Debug, Clone, Default)]
pub struct RecordingMessageSender {
    script: Arc<Mutex<Script>>,
}

impl RecordingMessageSender {
    /// Create a sender that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next `count` messages.
    pub fn fail_next(&self, count: u32) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .fail_next = count;
    }

    /// Reject every message while `offline` is set.
    pub fn set_offline(&self, offline: bool) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .offline = offline;
    }

    /// Every send attempt, delivered or not.
    #[must_use]
    pub fn attempts(&self) -> Vec<SentMessage> {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .attempts
            .clone()
    }

    /// Successfully delivered messages.
    #[must_use]
    pub fn delivered(&self) -> Vec<SentMessage> {
        self.attempts().into_iter().filter(|m| m.delivered).collect()
    }

    /// Delivered messages for one recipient.
    #[must_use]
    pub fn delivered_to(&self, recipient: &str) -> Vec<SentMessage> {
        self.delivered()
            .into_iter()
            .filter(|m| m.recipient == recipient)
            .collect()
    }
}

impl MessageSender for RecordingMessageSender {
    fn send<'a>(
        &'a self,
        recipient: &'a str,
        body: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), DeliveryError>> + Send + 'a>> {
        Box::pin(async move {
            let mut script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
            let fail = if script.offline {
                true
            } else if script.fail_next > 0 {
                script.fail_next -= 1;
                true
            } else {
                false
            };

            script.attempts.push(SentMessage {
                recipient: recipient.to_string(),
                body: body.to_string(),
                delivered: !fail,
            });

            if fail {
                Err(DeliveryError::Unavailable("simulated gateway failure".into()))
            } else {
                Ok(())
            }
        })
    }
}
