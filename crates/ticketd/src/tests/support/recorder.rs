//! Subscriber double that records every published message.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::dispatch::{Message, MessageSubscriber, SubscriberError};
use crate::registry::ConnectionId;

const WAIT_TIMEOUT: Duration = Duration::from_secs(2);
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Polls `condition` until it holds or the timeout elapses.
pub fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + WAIT_TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
    condition()
}

/// Records messages in arrival order.
#[derive(Debug, Default)]
pub struct MessageRecorder {
    messages: Mutex<Vec<Message>>,
}

impl MessageRecorder {
    /// Every message seen so far.
    pub fn messages(&self) -> Vec<Message> {
        self.messages
            .lock()
            .expect("message recorder mutex poisoned")
            .clone()
    }

    /// Payloads published for `connection`, in order.
    pub fn payloads_for(&self, connection: ConnectionId) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter(|message| message.connection() == connection)
            .map(Message::into_payload)
            .collect()
    }
}

impl MessageSubscriber for MessageRecorder {
    fn on_message(&self, message: &Message) -> Result<(), SubscriberError> {
        self.messages
            .lock()
            .expect("message recorder mutex poisoned")
            .push(message.clone());
        Ok(())
    }
}
