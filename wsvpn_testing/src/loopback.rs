//! Two real connections wired back to back.

use std::sync::Arc;

use wsvpn::{
    Connection,
    ConnectionBuilder,
    adapter::memory::{self, MemoryAdapter},
    iface::memory::{InterfaceTap, MemoryInterface},
};

use crate::STEP_TIMEOUT;

/// One end of a [`Loopback`].
pub struct LoopbackSide {
    pub conn: Arc<Connection>,
    pub adapter: Arc<MemoryAdapter>,
    pub iface: Arc<MemoryInterface>,
    pub tap: InterfaceTap,
}

/// Two connections over a memory transport, each with a managed memory
/// interface.
pub struct Loopback {
    pub left: LoopbackSide,
    pub right: LoopbackSide,
}

fn side(
    adapter: Arc<MemoryAdapter>,
    configure: impl FnOnce(ConnectionBuilder) -> ConnectionBuilder,
) -> LoopbackSide {
    let (iface, tap) = MemoryInterface::with_tap();
    let conn = configure(Connection::builder(adapter.clone()).interface(iface.clone(), true)).build();
    LoopbackSide {
        conn,
        adapter,
        iface,
        tap,
    }
}

impl Loopback {
    /// Build both connections without serving them.
    pub fn new(
        max_message_size: Option<usize>,
        left: impl FnOnce(ConnectionBuilder) -> ConnectionBuilder,
        right: impl FnOnce(ConnectionBuilder) -> ConnectionBuilder,
    ) -> Self {
        let (left_adapter, right_adapter) = memory::pair(max_message_size);
        Self {
            left: side(left_adapter, left),
            right: side(right_adapter, right),
        }
    }

    /// Serve both connections and wait until both completed the handshake.
    ///
    /// # Panics
    ///
    /// Panics if serving fails or the handshake does not finish within
    /// [`STEP_TIMEOUT`].
    pub async fn start(&self) {
        let (left, right) = tokio::join!(self.left.conn.serve(), self.right.conn.serve());
        left.expect("serve left");
        right.expect("serve right");
        tokio::time::timeout(STEP_TIMEOUT, async {
            tokio::join!(self.left.conn.wait_ready(), self.right.conn.wait_ready());
        })
        .await
        .expect("handshake timed out");
    }

    /// Close both connections and join their workers.
    pub async fn shutdown(&self) {
        tokio::join!(self.left.conn.close(), self.right.conn.close());
        tokio::time::timeout(STEP_TIMEOUT, async {
            tokio::join!(self.left.conn.wait(), self.right.conn.wait());
        })
        .await
        .expect("workers did not exit");
    }
}
