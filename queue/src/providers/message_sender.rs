//! Outbound messaging trait.

use crate::error::DeliveryError;
use std::future::Future;
use std::pin::Pin;

/// Delivers a rendered message to a customer (SMS, push, chat app).
pub trait MessageSender: Send + Sync {
    /// Send `body` to `recipient`.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError`] if the gateway rejects the message or
    /// cannot be reached.
    fn send<'a>(
        &'a self,
        recipient: &'a str,
        body: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), DeliveryError>> + Send + 'a>>;
}
