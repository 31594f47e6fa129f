//! Subscription list and synchronous publishing.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, warn};

use super::{DISPATCH_TARGET, Message, MessageSubscriber, SubscriberError};

/// Handle identifying a subscription for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Outcome of a single publish call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Subscribers that handled the message.
    pub delivered: usize,
    /// Subscribers that returned an error or panicked.
    pub failed: usize,
}

type Subscription = (SubscriptionId, Arc<dyn MessageSubscriber>);

/// Ordered list of subscribers notified for every framed message.
#[derive(Default)]
pub struct EventDispatcher {
    subscribers: RwLock<Vec<Subscription>>,
    next_id: AtomicU64,
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("EventDispatcher")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl EventDispatcher {
    /// Creates a dispatcher without subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `subscriber` to the notification list.
    pub fn subscribe<S>(&self, subscriber: S) -> SubscriptionId
    where
        S: MessageSubscriber + 'static,
    {
        self.subscribe_shared(Arc::new(subscriber))
    }

    /// Appends an already shared subscriber to the notification list.
    pub fn subscribe_shared(&self, subscriber: Arc<dyn MessageSubscriber>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.write().push((id, subscriber));
        id
    }

    /// Removes a subscription. Returns `false` when it was not present.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.write();
        let before = subscribers.len();
        subscribers.retain(|(candidate, _)| *candidate != id);
        subscribers.len() != before
    }

    /// Number of active subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.read().len()
    }

    /// Delivers `message` to every subscriber in subscription order.
    ///
    /// Subscribers run outside the subscription lock, so they may subscribe
    /// or unsubscribe without deadlocking; such changes apply from the next
    /// publish onwards.
    pub fn publish(&self, message: &Message) -> PublishReport {
        let subscribers: Vec<Subscription> = self.read().clone();
        let mut report = PublishReport::default();
        for (id, subscriber) in subscribers {
            match deliver(subscriber.as_ref(), message) {
                Ok(()) => report.delivered += 1,
                Err(error) => {
                    report.failed += 1;
                    warn!(
                        target: DISPATCH_TARGET,
                        subscription = %id,
                        connection = %message.connection(),
                        error = %error,
                        "subscriber failed to handle message"
                    );
                }
            }
        }
        debug!(
            target: DISPATCH_TARGET,
            connection = %message.connection(),
            delivered = report.delivered,
            failed = report.failed,
            "message published"
        );
        report
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Subscription>> {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Subscription>> {
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn deliver(subscriber: &dyn MessageSubscriber, message: &Message) -> Result<(), SubscriberError> {
    panic::catch_unwind(AssertUnwindSafe(|| subscriber.on_message(message))).unwrap_or_else(
        |payload| {
            Err(SubscriberError::Panicked {
                message: panic_message(payload.as_ref()),
            })
        },
    )
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_owned()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
