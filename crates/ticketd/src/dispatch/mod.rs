//! Fan-out of framed messages to registered subscribers.
//!
//! Delivery is synchronous and runs on the connection thread that framed the
//! message, so messages from one connection reach each subscriber in stream
//! order. A failing or panicking subscriber is logged and skipped; it never
//! stops later subscribers or the connection that published.

mod dispatcher;
mod errors;
mod message;
mod subscriber;

pub use self::dispatcher::{EventDispatcher, PublishReport, SubscriptionId};
pub use self::errors::SubscriberError;
pub use self::message::Message;
pub use self::subscriber::{MessageSubscriber, TicketLogSubscriber};

const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");
