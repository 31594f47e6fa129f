//! Connection handling: the read, frame and dispatch cycle for one client.

use std::io::{self, Read};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use crate::dispatch::{EventDispatcher, Message};
use crate::framing::{FramingError, FramingOptions, LineFramer};
use crate::registry::{
    Connection, ConnectionCloser, ConnectionGuard, ConnectionId, ConnectionRegistry,
};

use super::LISTENER_TARGET;

/// Accepted socket that is already registered.
///
/// The registry entry is created on the accept thread before any handler
/// runs and is removed when this value is dropped.
#[derive(Debug)]
pub struct AcceptedStream {
    stream: TcpStream,
    peer: SocketAddr,
    closer: Arc<SocketCloser>,
    guard: ConnectionGuard,
}

impl AcceptedStream {
    /// Assigns a fresh [`ConnectionId`] to `stream` and records it in
    /// `registry`, where [`ConnectionRegistry::close_all`] can cancel it.
    ///
    /// # Errors
    ///
    /// Fails when the socket cannot be cloned for cancellation.
    pub fn register(
        stream: TcpStream,
        peer: SocketAddr,
        registry: &Arc<ConnectionRegistry>,
    ) -> io::Result<Self> {
        let closer = Arc::new(SocketCloser::new(stream.try_clone()?));
        let guard = registry.register(
            Connection::new(ConnectionId::next(), peer),
            Arc::clone(&closer) as Arc<dyn ConnectionCloser>,
        );
        Ok(Self {
            stream,
            peer,
            closer,
            guard,
        })
    }

    /// Identifier under which the connection is registered.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.guard.id()
    }

    /// Remote endpoint.
    #[must_use]
    pub const fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Whether the server has cancelled this connection.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.closer.is_cancelled()
    }
}

/// Handles accepted socket connections.
pub trait ConnectionHandler: Send + Sync + 'static {
    /// Handles a single connection until it closes. Dropping `stream`
    /// unregisters the connection. Implementations should avoid panicking.
    fn handle(&self, stream: AcceptedStream);
}

/// Why a connection's read loop stopped.
#[derive(Debug)]
pub enum ConnectionEnd {
    /// The peer closed the stream (a read returned zero bytes).
    Disconnected,
    /// A read failed with something other than an orderly close.
    ReadFailed(io::Error),
    /// A line exceeded the configured cap.
    MessageTooLong(FramingError),
    /// The server cancelled the read while shutting down.
    Cancelled,
}

impl ConnectionEnd {
    /// Short label recorded in logs.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::ReadFailed(_) => "read_failed",
            Self::MessageTooLong(_) => "message_too_long",
            Self::Cancelled => "cancelled",
        }
    }
}

/// What a finished session did.
#[derive(Debug)]
pub struct SessionSummary {
    /// Termination cause.
    pub end: ConnectionEnd,
    /// Messages handed to the dispatcher.
    pub messages: usize,
    /// Unterminated trailing bytes dropped at teardown.
    pub discarded_bytes: usize,
}

/// Frames each connection's bytes into lines and publishes them.
#[derive(Debug)]
pub struct LineConnectionHandler {
    dispatcher: Arc<EventDispatcher>,
    options: FramingOptions,
}

impl LineConnectionHandler {
    /// Builds a handler that publishes framed lines through `dispatcher`.
    #[must_use]
    pub const fn new(dispatcher: Arc<EventDispatcher>, options: FramingOptions) -> Self {
        Self {
            dispatcher,
            options,
        }
    }

    /// Runs the read loop for connection `id` over `reader` until the stream
    /// ends. Every line completed by a read is published before the next read
    /// is issued. Bytes left without a terminator are discarded.
    pub fn run_session<R: Read>(&self, id: ConnectionId, mut reader: R) -> SessionSummary {
        let mut framer = LineFramer::with_limit(self.options.max_line_bytes());
        let mut chunk = vec![0_u8; self.options.read_chunk_bytes().get()];
        let mut messages = 0_usize;
        let end = loop {
            let bytes_read = match read_chunk_with_retry(&mut reader, &mut chunk) {
                Ok(0) => break ConnectionEnd::Disconnected,
                Ok(read) => read,
                Err(error) => break ConnectionEnd::ReadFailed(error),
            };
            framer.extend(chunk.get(..bytes_read).unwrap_or_default());
            if let Err(error) = self.publish_complete_lines(id, &mut framer, &mut messages) {
                break ConnectionEnd::MessageTooLong(error);
            }
        };
        SessionSummary {
            end,
            messages,
            discarded_bytes: framer.pending_len(),
        }
    }

    fn publish_complete_lines(
        &self,
        id: ConnectionId,
        framer: &mut LineFramer,
        messages: &mut usize,
    ) -> Result<(), FramingError> {
        while let Some(payload) = framer.next_message()? {
            debug!(
                target: LISTENER_TARGET,
                connection = %id,
                bytes = payload.len(),
                "message framed"
            );
            self.dispatcher.publish(&Message::new(id, payload));
            *messages += 1;
        }
        Ok(())
    }
}

impl ConnectionHandler for LineConnectionHandler {
    fn handle(&self, stream: AcceptedStream) {
        let id = stream.id();
        let peer = stream.peer();
        let mut summary = self.run_session(id, &stream.stream);
        if stream.is_cancelled()
            && matches!(
                summary.end,
                ConnectionEnd::Disconnected | ConnectionEnd::ReadFailed(_)
            )
        {
            summary.end = ConnectionEnd::Cancelled;
        }

        drop(stream);
        log_session_end(id, peer, &summary);
    }
}

/// Shuts a socket down to unblock the read pending on it.
#[derive(Debug)]
struct SocketCloser {
    stream: TcpStream,
    cancelled: AtomicBool,
}

impl SocketCloser {
    const fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            cancelled: AtomicBool::new(false),
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl ConnectionCloser for SocketCloser {
    fn close(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Err(error) = self.stream.shutdown(Shutdown::Both)
            && error.kind() != io::ErrorKind::NotConnected
        {
            debug!(
                target: LISTENER_TARGET,
                error = %error,
                "failed to shut down connection socket"
            );
        }
    }
}

fn read_chunk_with_retry<R: Read>(reader: &mut R, chunk: &mut [u8]) -> io::Result<usize> {
    loop {
        match reader.read(chunk) {
            Ok(read) => return Ok(read),
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(error),
        }
    }
}

fn log_session_end(id: ConnectionId, peer: SocketAddr, summary: &SessionSummary) {
    match &summary.end {
        ConnectionEnd::Disconnected | ConnectionEnd::Cancelled => info!(
            target: LISTENER_TARGET,
            connection = %id,
            peer = %peer,
            reason = summary.end.reason(),
            messages = summary.messages,
            discarded_bytes = summary.discarded_bytes,
            "connection closed"
        ),
        ConnectionEnd::ReadFailed(error) => warn!(
            target: LISTENER_TARGET,
            connection = %id,
            peer = %peer,
            reason = summary.end.reason(),
            messages = summary.messages,
            discarded_bytes = summary.discarded_bytes,
            error = %error,
            "connection read failed"
        ),
        ConnectionEnd::MessageTooLong(error) => warn!(
            target: LISTENER_TARGET,
            connection = %id,
            peer = %peer,
            reason = summary.end.reason(),
            messages = summary.messages,
            error = %error,
            "connection dropped"
        ),
    }
}
