//! Server facade tying the listener, registry and dispatcher together.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ticket_config::Config;
use tracing::warn;

use crate::dispatch::{EventDispatcher, MessageSubscriber, SubscriptionId};
use crate::framing::FramingOptions;
use crate::registry::ConnectionRegistry;
use crate::transport::{LineConnectionHandler, ListenerError, ListenerHandle, SocketListener};

const SERVER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::server");

/// Line-framing TCP server.
///
/// Subscribers registered through [`TicketServer::dispatcher`] receive every
/// framed message from every connection. At most one listener runs per server
/// at a time.
#[derive(Debug)]
pub struct TicketServer {
    host: String,
    options: FramingOptions,
    registry: Arc<ConnectionRegistry>,
    dispatcher: Arc<EventDispatcher>,
    active: Arc<AtomicBool>,
}

impl TicketServer {
    /// Creates a server that will bind on `host`.
    #[must_use]
    pub fn new(host: impl Into<String>, options: FramingOptions) -> Self {
        Self {
            host: host.into(),
            options,
            registry: Arc::new(ConnectionRegistry::new()),
            dispatcher: Arc::new(EventDispatcher::new()),
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Creates a server from the resolved configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.listen_host.clone(), FramingOptions::from_config(config))
    }

    /// Dispatcher notified of every framed message.
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    /// Registry of currently open connections.
    #[must_use]
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Shorthand for subscribing on the server's dispatcher.
    pub fn subscribe<S>(&self, subscriber: S) -> SubscriptionId
    where
        S: MessageSubscriber + 'static,
    {
        self.dispatcher.subscribe(subscriber)
    }

    /// Binds `port` and starts accepting connections.
    ///
    /// # Errors
    ///
    /// Fails with [`ListenerError::AlreadyActive`] while a handle returned by
    /// an earlier call is alive, and with a bind error when the port cannot
    /// be acquired.
    pub fn start(&self, port: u16) -> Result<ServerHandle, ListenerError> {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ListenerError::AlreadyActive);
        }
        let active = ActiveFlag(Arc::clone(&self.active));

        let listener = SocketListener::bind(&self.host, port)?;
        let handler = Arc::new(LineConnectionHandler::new(
            Arc::clone(&self.dispatcher),
            self.options,
        ));
        let listener = listener.start(Arc::clone(&self.registry), handler)?;
        Ok(ServerHandle {
            listener: Some(listener),
            _active: active,
        })
    }
}

// Releases the server's single-listener slot when dropped.
#[derive(Debug)]
struct ActiveFlag(Arc<AtomicBool>);

impl Drop for ActiveFlag {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Running server. Dropping the handle stops the listener and waits for every
/// connection to be torn down.
#[derive(Debug)]
pub struct ServerHandle {
    listener: Option<ListenerHandle>,
    _active: ActiveFlag,
}

impl ServerHandle {
    /// Address the server is listening on.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().map(ListenerHandle::local_addr)
    }

    /// Requests shutdown without waiting.
    pub fn shutdown(&self) {
        if let Some(listener) = &self.listener {
            listener.shutdown();
        }
    }

    /// Shuts down and waits for the listener and its connections to finish.
    pub fn stop(mut self) -> Result<(), ListenerError> {
        self.stop_listener()
    }

    fn stop_listener(&mut self) -> Result<(), ListenerError> {
        let Some(listener) = self.listener.take() else {
            return Ok(());
        };
        listener.shutdown();
        listener.join()
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Err(error) = self.stop_listener() {
            warn!(
                target: SERVER_TARGET,
                error = %error,
                "listener did not stop cleanly"
            );
        }
    }
}
