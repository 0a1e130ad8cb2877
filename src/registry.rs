//! Registry of live connections and the packet handler contract.
//!
//! A [`PacketHandler`] is the server-side collaborator that sees every
//! connection: it is told when a connection starts and stops serving and may
//! claim inbound packets before they reach the virtual interface.
//! [`SocketRegistry`] is a handler that only keeps track of live
//! connections; it stores weak references so it never keeps a closed
//! connection alive.

use std::{
    fmt,
    sync::{
        Arc,
        Weak,
        atomic::{AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::join_all;

use crate::connection::Connection;

/// Process-unique identifier of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

impl ConnectionId {
    /// Allocate the next unused identifier.
    #[must_use]
    pub fn next() -> Self { Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)) }

    /// Wrap an explicit value.
    #[must_use]
    pub const fn new(id: u64) -> Self { Self(id) }

    #[must_use]
    pub const fn as_u64(&self) -> u64 { self.0 }
}

impl From<u64> for ConnectionId {
    fn from(value: u64) -> Self { Self(value) }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "conn-{}", self.0) }
}

/// Collaborator notified about connection lifetimes.
#[async_trait]
pub trait PacketHandler: Send + Sync + 'static {
    /// Called once when `conn` starts serving.
    async fn register_socket(&self, conn: &Arc<Connection>);

    /// Called once when `conn` closes.
    async fn unregister_socket(&self, conn: &Connection);

    /// Offered every inbound packet first; return `true` to consume it.
    async fn handle_packet(&self, _conn: &Connection, _packet: &[u8]) -> bool { false }
}

/// Concurrent map of live connections keyed by [`ConnectionId`].
#[derive(Default)]
pub struct SocketRegistry(DashMap<ConnectionId, Weak<Connection>>);

impl SocketRegistry {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Retrieve `id` if the connection is still alive.
    ///
    /// A dead entry found on the way is removed.
    pub fn get(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        let guard = self.0.get(id);
        let conn = guard.as_ref().and_then(|weak| weak.upgrade());
        drop(guard);
        if conn.is_none() {
            self.0.remove_if(id, |_, weak| weak.strong_count() == 0);
        }
        conn
    }

    /// Number of entries, including any not yet pruned.
    #[must_use]
    pub fn len(&self) -> usize { self.0.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    /// Remove entries whose connection has been dropped.
    pub fn prune(&self) { self.0.retain(|_, weak| weak.strong_count() > 0); }

    /// Prune dead entries, then return the ids of live connections.
    #[must_use]
    pub fn active_ids(&self) -> Vec<ConnectionId> {
        let mut ids = Vec::with_capacity(self.0.len());
        self.0.retain(|id, weak| {
            let alive = weak.strong_count() > 0;
            if alive {
                ids.push(*id);
            }
            alive
        });
        ids.sort_unstable();
        ids
    }

    /// Close every live connection.
    pub async fn close_all(&self) {
        let live: Vec<Arc<Connection>> = self.0.iter().filter_map(|entry| entry.upgrade()).collect();
        join_all(live.iter().map(|conn| conn.close())).await;
    }
}

#[async_trait]
impl PacketHandler for SocketRegistry {
    async fn register_socket(&self, conn: &Arc<Connection>) {
        self.0.insert(conn.id(), Arc::downgrade(conn));
    }

    async fn unregister_socket(&self, conn: &Connection) { self.0.remove(&conn.id()); }
}

impl fmt::Debug for SocketRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketRegistry")
            .field("len", &self.0.len())
            .finish()
    }
}
