//! Line-framing TCP front end for the ticket consumer.
//!
//! The server accepts any number of concurrent TCP clients, reframes each
//! client's byte stream into newline-terminated messages and publishes every
//! message, tagged with the originating connection, to the subscribers
//! registered on its [`EventDispatcher`].
//!
//! Each connection owns a [`LineFramer`]. After every read the framer drains
//! all complete lines, so several messages arriving in one chunk are
//! delivered before the next read is issued. Whitespace around a line,
//! including a carriage return before the `\n`, is trimmed. Bytes left
//! without a terminator when a client disconnects are discarded.
//!
//! Open connections are tracked in a [`ConnectionRegistry`]. Entries are
//! removed by the connection's own thread on every exit path, and shutting
//! the listener down cancels reads still in flight.
//!
//! ```no_run
//! use ticketd::{FramingOptions, Message, SubscriberError, TicketServer};
//!
//! # fn main() -> Result<(), ticketd::ListenerError> {
//! let server = TicketServer::new("0.0.0.0", FramingOptions::default());
//! server.subscribe(|message: &Message| -> Result<(), SubscriberError> {
//!     println!("{}: {}", message.connection(), message.payload());
//!     Ok(())
//! });
//! let handle = server.start(23)?;
//! handle.stop()?;
//! # Ok(())
//! # }
//! ```

mod bootstrap;
mod dispatch;
mod framing;
mod health;
mod process;
mod registry;
mod server;
pub mod telemetry;
mod transport;

pub use bootstrap::{
    BootstrapError, ConfigLoader, Daemon, StaticConfigLoader, SystemConfigLoader, bootstrap_with,
};
pub use dispatch::{
    EventDispatcher, Message, MessageSubscriber, PublishReport, SubscriberError, SubscriptionId,
    TicketLogSubscriber,
};
pub use framing::{FramingError, FramingOptions, LineFramer, TERMINATOR};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use process::{
    LaunchError, ShutdownError, ShutdownSignal, SystemShutdownSignal, TERMINATION_SIGNALS, run_daemon,
};
pub use registry::{
    Connection, ConnectionCloser, ConnectionGuard, ConnectionId, ConnectionRegistry,
};
pub use server::{ServerHandle, TicketServer};
pub use telemetry::{TelemetryError, TelemetryHandle};
pub use transport::{
    AcceptedStream, ConnectionEnd, ConnectionHandler, LineConnectionHandler, ListenerError,
    ListenerHandle, SessionSummary, SocketListener,
};

#[cfg(test)]
mod tests;
