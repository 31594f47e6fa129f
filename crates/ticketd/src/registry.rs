//! Bookkeeping for open client connections.
//!
//! The registry is the only state shared between the accept thread and the
//! per-connection threads, so every access goes through its own locked
//! operations. Handlers hold a [`ConnectionGuard`] for the lifetime of their
//! session; dropping the guard removes the entry on every exit path.

use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier assigned to each accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocates the next identifier.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Wraps a raw identifier.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw numeric value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// An accepted client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    id: ConnectionId,
    peer: SocketAddr,
}

impl Connection {
    /// Describes a connection from `peer`.
    #[must_use]
    pub const fn new(id: ConnectionId, peer: SocketAddr) -> Self {
        Self { id, peer }
    }

    /// Connection identifier.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Remote endpoint.
    #[must_use]
    pub const fn peer(&self) -> SocketAddr {
        self.peer
    }
}

/// Aborts a connection's in-flight read so its handler can tear down.
pub trait ConnectionCloser: Send + Sync {
    /// Requests the connection to close. Must not block.
    fn close(&self);
}

struct Entry {
    connection: Connection,
    closer: Option<Arc<dyn ConnectionCloser>>,
}

/// Thread-safe set of open connections keyed by identifier.
#[derive(Default)]
pub struct ConnectionRegistry {
    entries: Mutex<BTreeMap<ConnectionId, Entry>>,
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ConnectionRegistry")
            .field("open", &self.len())
            .finish()
    }
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an open connection. An entry with the same identifier is replaced.
    pub fn add(&self, connection: Connection) {
        self.insert(connection, None);
    }

    /// Records an open connection that can be cancelled through `closer`.
    /// The returned guard removes the entry when dropped.
    #[must_use = "dropping the guard immediately unregisters the connection"]
    pub fn register(
        self: &Arc<Self>,
        connection: Connection,
        closer: Arc<dyn ConnectionCloser>,
    ) -> ConnectionGuard {
        self.insert(connection, Some(closer));
        ConnectionGuard {
            registry: Arc::clone(self),
            id: connection.id(),
        }
    }

    /// Forgets a connection, returning its record if it was present.
    pub fn remove(&self, id: ConnectionId) -> Option<Connection> {
        self.lock().remove(&id).map(|entry| entry.connection)
    }

    /// Point-in-time copy of the open connections, ordered by identifier.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Connection> {
        self.lock().values().map(|entry| entry.connection).collect()
    }

    /// Whether `id` is currently registered.
    #[must_use]
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.lock().contains_key(&id)
    }

    /// Number of open connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no connections are open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Cancels every cancellable connection and returns how many were signalled.
    /// Entries stay registered until their handlers finish tearing down.
    pub fn close_all(&self) -> usize {
        let closers: Vec<Arc<dyn ConnectionCloser>> = self
            .lock()
            .values()
            .filter_map(|entry| entry.closer.clone())
            .collect();
        for closer in &closers {
            closer.close();
        }
        closers.len()
    }

    fn insert(&self, connection: Connection, closer: Option<Arc<dyn ConnectionCloser>>) {
        self.lock()
            .insert(connection.id(), Entry { connection, closer });
    }

    // Entries are plain data, so a panic while the lock was held cannot leave
    // the map half-updated.
    fn lock(&self) -> MutexGuard<'_, BTreeMap<ConnectionId, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Keeps a connection registered until dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    registry: Arc<ConnectionRegistry>,
    id: ConnectionId,
}

impl ConnectionGuard {
    /// Identifier of the guarded connection.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}
