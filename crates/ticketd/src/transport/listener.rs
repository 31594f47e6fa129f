//! Listener implementation for the ticket TCP endpoint.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::registry::ConnectionRegistry;

use super::{AcceptedStream, ConnectionHandler, LISTENER_TARGET, ListenerError};

const ACCEPT_BACKOFF: Duration = Duration::from_millis(25);
const ERROR_BACKOFF: Duration = Duration::from_millis(150);
const ACCEPT_THREAD_NAME: &str = "ticketd-accept";
const CONNECTION_THREAD_NAME: &str = "ticketd-conn";

/// Listener bound to a TCP port but not yet accepting.
#[derive(Debug)]
pub struct SocketListener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl SocketListener {
    /// Binds `host:port`. Port zero picks an ephemeral port.
    pub fn bind(host: &str, port: u16) -> Result<Self, ListenerError> {
        let listener = bind_tcp(host, port)?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ListenerError::LocalAddr { source })?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Address the listener is bound to.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Starts accepting on a background thread. Each accepted connection is
    /// recorded in `registry` on that thread, then handed to `handler` on a
    /// thread of its own.
    pub fn start(
        self,
        registry: Arc<ConnectionRegistry>,
        handler: Arc<dyn ConnectionHandler>,
    ) -> Result<ListenerHandle, ListenerError> {
        self.listener
            .set_nonblocking(true)
            .map_err(|source| ListenerError::NonBlocking { source })?;
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_flag = Arc::clone(&shutdown);
        let local_addr = self.local_addr;
        let handle = thread::Builder::new()
            .name(ACCEPT_THREAD_NAME.to_owned())
            .spawn(move || run_accept_loop(&self, &shutdown_flag, &registry, &handler))
            .map_err(|source| ListenerError::Spawn { source })?;
        Ok(ListenerHandle {
            shutdown,
            local_addr,
            handle: Some(handle),
        })
    }
}

/// Handle to the background accept thread.
///
/// Dropping the handle requests shutdown without waiting for it.
#[derive(Debug)]
pub struct ListenerHandle {
    shutdown: Arc<AtomicBool>,
    local_addr: SocketAddr,
    handle: Option<thread::JoinHandle<()>>,
}

impl ListenerHandle {
    /// Address the listener is bound to.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting and cancels every open connection.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Waits for the accept thread and every connection thread to finish.
    pub fn join(mut self) -> Result<(), ListenerError> {
        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(()) => Ok(()),
                Err(_) => Err(ListenerError::ThreadPanic),
            }
        } else {
            Ok(())
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

fn run_accept_loop(
    listener: &SocketListener,
    shutdown: &AtomicBool,
    registry: &Arc<ConnectionRegistry>,
    handler: &Arc<dyn ConnectionHandler>,
) {
    info!(
        target: LISTENER_TARGET,
        endpoint = %listener.local_addr,
        "socket listener active"
    );
    let mut connections: Vec<thread::JoinHandle<()>> = Vec::new();
    let mut last_error = None::<io::ErrorKind>;
    while !shutdown.load(Ordering::SeqCst) {
        match accept_connection(listener) {
            Ok(Some((stream, peer))) => {
                last_error = None;
                connections.retain(|connection| !connection.is_finished());
                let Some(stream) = admit_connection(registry, stream, peer) else {
                    continue;
                };
                if let Some(connection) = spawn_connection(handler, stream) {
                    connections.push(connection);
                }
            }
            Ok(None) => {
                thread::sleep(ACCEPT_BACKOFF);
            }
            Err(error) => {
                let kind = error.kind();
                if last_error != Some(kind) {
                    warn!(
                        target: LISTENER_TARGET,
                        error = %error,
                        "socket accept error"
                    );
                }
                last_error = Some(kind);
                thread::sleep(ERROR_BACKOFF);
            }
        }
    }

    // Every registration happened on this thread, so the sweep sees them all.
    let cancelled = registry.close_all();
    debug!(
        target: LISTENER_TARGET,
        cancelled,
        "cancelling open connections"
    );
    for connection in connections {
        if connection.join().is_err() {
            warn!(
                target: LISTENER_TARGET,
                "connection thread panicked"
            );
        }
    }
    info!(
        target: LISTENER_TARGET,
        endpoint = %listener.local_addr,
        "socket listener stopped"
    );
}

fn admit_connection(
    registry: &Arc<ConnectionRegistry>,
    stream: TcpStream,
    peer: SocketAddr,
) -> Option<AcceptedStream> {
    match AcceptedStream::register(stream, peer, registry) {
        Ok(accepted) => {
            info!(
                target: LISTENER_TARGET,
                connection = %accepted.id(),
                peer = %peer,
                "incoming connection"
            );
            Some(accepted)
        }
        Err(error) => {
            warn!(
                target: LISTENER_TARGET,
                peer = %peer,
                error = %error,
                "failed to register connection socket"
            );
            None
        }
    }
}

fn spawn_connection(
    handler: &Arc<dyn ConnectionHandler>,
    stream: AcceptedStream,
) -> Option<thread::JoinHandle<()>> {
    let peer = stream.peer();
    let handler = Arc::clone(handler);
    match thread::Builder::new()
        .name(CONNECTION_THREAD_NAME.to_owned())
        .spawn(move || handler.handle(stream))
    {
        Ok(connection) => Some(connection),
        Err(error) => {
            // The closure, and with it the stream, is dropped here.
            warn!(
                target: LISTENER_TARGET,
                peer = %peer,
                error = %error,
                "failed to spawn connection thread"
            );
            None
        }
    }
}

fn accept_connection(
    listener: &SocketListener,
) -> Result<Option<(TcpStream, SocketAddr)>, io::Error> {
    match listener.listener.accept() {
        Ok((stream, peer)) => {
            stream.set_nonblocking(false)?;
            Ok(Some((stream, peer)))
        }
        Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(None),
        Err(error) => Err(error),
    }
}

fn bind_tcp(host: &str, port: u16) -> Result<TcpListener, ListenerError> {
    let mut addrs = (host, port)
        .to_socket_addrs()
        .map_err(|source| ListenerError::Resolve {
            host: host.to_owned(),
            port,
            source,
        })?;
    let addr = addrs
        .find(|addr| matches!(addr, SocketAddr::V4(_) | SocketAddr::V6(_)))
        .ok_or_else(|| ListenerError::ResolveEmpty {
            host: host.to_owned(),
            port,
        })?;
    TcpListener::bind(addr).map_err(|source| ListenerError::Bind { addr, source })
}
