use std::sync::{
    Arc,
    Mutex,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use bytes::Bytes;
use wsvpn::{Connection, ConnectionId, PacketHandler};

/// A [`PacketHandler`] that records every callback.
///
/// Packets are passed through to the interface unless
/// [`consume_packets`](Self::consume_packets) is switched on.
#[derive(Debug, Default)]
pub struct RecordingPacketHandler {
    registered: Mutex<Vec<ConnectionId>>,
    unregistered: Mutex<Vec<ConnectionId>>,
    packets: Mutex<Vec<Bytes>>,
    consume: AtomicBool,
}

impl RecordingPacketHandler {
    pub fn new() -> Arc<Self> { Arc::new(Self::default()) }

    /// Claim inbound packets instead of letting them reach the interface.
    pub fn consume_packets(&self, consume: bool) { self.consume.store(consume, Ordering::SeqCst); }

    pub fn registered(&self) -> Vec<ConnectionId> { self.registered.lock().expect("lock poisoned").clone() }

    pub fn unregistered(&self) -> Vec<ConnectionId> {
        self.unregistered.lock().expect("lock poisoned").clone()
    }

    pub fn packets(&self) -> Vec<Bytes> { self.packets.lock().expect("lock poisoned").clone() }
}

#[async_trait]
impl PacketHandler for RecordingPacketHandler {
    async fn register_socket(&self, conn: &Arc<Connection>) {
        self.registered.lock().expect("lock poisoned").push(conn.id());
    }

    async fn unregister_socket(&self, conn: &Connection) {
        self.unregistered.lock().expect("lock poisoned").push(conn.id());
    }

    async fn handle_packet(&self, _conn: &Connection, packet: &[u8]) -> bool {
        self.packets
            .lock()
            .expect("lock poisoned")
            .push(Bytes::copy_from_slice(packet));
        self.consume.load(Ordering::SeqCst)
    }
}
