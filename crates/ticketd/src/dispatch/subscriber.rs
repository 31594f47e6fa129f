//! Subscriber trait and the built-in logging subscriber.

use tracing::info;

use super::{DISPATCH_TARGET, Message, SubscriberError};

/// Receives every message published by the dispatcher.
pub trait MessageSubscriber: Send + Sync {
    /// Handles a single message. Errors are logged by the dispatcher.
    fn on_message(&self, message: &Message) -> Result<(), SubscriberError>;
}

impl<F> MessageSubscriber for F
where
    F: Fn(&Message) -> Result<(), SubscriberError> + Send + Sync,
{
    fn on_message(&self, message: &Message) -> Result<(), SubscriberError> {
        self(message)
    }
}

/// Records each ticket as a structured log event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TicketLogSubscriber;

impl MessageSubscriber for TicketLogSubscriber {
    fn on_message(&self, message: &Message) -> Result<(), SubscriberError> {
        info!(
            target: DISPATCH_TARGET,
            connection = %message.connection(),
            payload = message.payload(),
            "ticket received"
        );
        Ok(())
    }
}
