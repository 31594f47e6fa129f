//! TCP listener and per-connection read loop.
//!
//! The listener binds a TCP port and accepts connections on a background
//! thread, handing each accepted stream to a [`ConnectionHandler`] on its own
//! thread.

mod errors;
mod handler;
mod listener;
#[cfg(test)]
mod listener_tests;
#[cfg(test)]
mod test_utils;

pub use self::errors::ListenerError;
pub use self::handler::{
    AcceptedStream, ConnectionEnd, ConnectionHandler, LineConnectionHandler, SessionSummary,
};
pub use self::listener::{ListenerHandle, SocketListener};
#[cfg(test)]
pub(crate) use self::test_utils::{CountingHandler, ScriptedReader};

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
