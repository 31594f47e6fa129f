//! Error type reported by message subscribers.

use thiserror::Error;

/// Failure raised by a subscriber while handling a message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscriberError {
    /// The subscriber rejected the message.
    #[error("subscriber failed: {message}")]
    Failed {
        /// Description supplied by the subscriber.
        message: String,
    },
    /// The subscriber panicked; the payload is rendered as text when possible.
    #[error("subscriber panicked: {message}")]
    Panicked {
        /// Panic payload.
        message: String,
    },
}

impl SubscriberError {
    /// Builds a [`SubscriberError::Failed`] from any displayable reason.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}
