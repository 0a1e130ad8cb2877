//! Shared setup for integration tests driving one connection by hand.
#![allow(dead_code, reason = "each test crate uses a different subset")]

use std::sync::Arc;

use wsvpn::{
    Connection,
    ConnectionBuilder,
    ConnectionConfig,
    PingConfig,
    adapter::memory::MemoryAdapter,
    iface::memory::{InterfaceTap, MemoryInterface},
};
use wsvpn_testing::{RawPeer, STEP_TIMEOUT};

pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// A connection under test, a raw peer on the other end of its transport
/// and the tap of its managed memory interface.
pub struct Harness {
    pub conn: Arc<Connection>,
    pub peer: RawPeer,
    pub adapter: Arc<MemoryAdapter>,
    pub iface: Arc<MemoryInterface>,
    pub tap: InterfaceTap,
}

/// Configuration used unless a test overrides it: keepalive off so pings do
/// not interleave with the commands a test expects.
pub fn quiet_config() -> ConnectionConfig { ConnectionConfig::default().with_ping(PingConfig::DISABLED) }

impl Harness {
    pub fn new(
        max_message_size: Option<usize>,
        configure: impl FnOnce(ConnectionBuilder) -> ConnectionBuilder,
    ) -> Self {
        let (peer, adapter) = RawPeer::new(max_message_size);
        let (iface, tap) = MemoryInterface::with_tap();
        let builder = Connection::builder(adapter.clone())
            .interface(iface.clone(), true)
            .config(quiet_config());
        Self {
            conn: configure(builder).build(),
            peer,
            adapter,
            iface,
            tap,
        }
    }

    /// Serve the connection and complete the handshake as a peer of
    /// `protocol_version`.
    pub async fn handshake(
        &mut self,
        protocol_version: u32,
        enable_fragmentation: bool,
        features: &[(wsvpn::Feature, bool)],
    ) -> TestResult {
        self.conn.serve().await?;
        self.peer
            .expect_command(&wsvpn::CommandName::VERSION)
            .await;
        self.peer
            .send_version(protocol_version, enable_fragmentation, features)
            .await;
        tokio::time::timeout(STEP_TIMEOUT, self.conn.wait_ready()).await?;
        Ok(())
    }

    /// Wait for every worker of the connection to exit.
    pub async fn joined(&self) -> TestResult {
        tokio::time::timeout(STEP_TIMEOUT, self.conn.wait()).await?;
        Ok(())
    }
}
