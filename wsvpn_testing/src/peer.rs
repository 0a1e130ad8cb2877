//! A hand-driven protocol peer.

use std::{collections::BTreeMap, sync::Arc};

use bytes::Bytes;
use futures::FutureExt;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use wsvpn::{
    Command,
    CommandName,
    Feature,
    MessageKind,
    TransportAdapter,
    adapter::memory::{self, MemoryAdapter},
};

use crate::STEP_TIMEOUT;

/// The far end of a memory transport, driven directly by a test.
pub struct RawPeer {
    adapter: Arc<MemoryAdapter>,
    inbox: mpsc::UnboundedReceiver<(MessageKind, Bytes)>,
    next_id: u64,
}

impl RawPeer {
    /// Create a peer and the adapter to hand to the connection under test.
    pub fn new(max_message_size: Option<usize>) -> (Self, Arc<MemoryAdapter>) {
        let (engine_side, peer_side) = memory::pair(max_message_size);
        let (tx, inbox) = mpsc::unbounded_channel();
        peer_side.set_message_handler(Arc::new(move |kind: MessageKind, payload: Bytes| {
            let _ = tx.send((kind, payload));
            async {}.boxed()
        }));
        let serving = Arc::clone(&peer_side);
        tokio::spawn(async move {
            let _ = serving.serve().await;
        });
        (
            Self {
                adapter: peer_side,
                inbox,
                next_id: 1000,
            },
            engine_side,
        )
    }

    /// The peer's own adapter.
    pub fn adapter(&self) -> &Arc<MemoryAdapter> { &self.adapter }

    /// Receive the next message of any kind.
    ///
    /// # Panics
    ///
    /// Panics if nothing arrives within [`STEP_TIMEOUT`] or the transport
    /// closed.
    pub async fn recv(&mut self) -> (MessageKind, Bytes) {
        tokio::time::timeout(STEP_TIMEOUT, self.inbox.recv())
            .await
            .expect("timed out waiting for a message")
            .expect("transport closed")
    }

    /// Receive the next message, or `None` once the transport closed.
    pub async fn try_recv(&mut self) -> Option<(MessageKind, Bytes)> {
        tokio::time::timeout(STEP_TIMEOUT, self.inbox.recv())
            .await
            .ok()
            .flatten()
    }

    /// Receive the next control command, skipping data messages.
    ///
    /// # Panics
    ///
    /// See [`recv`](Self::recv).
    pub async fn recv_command(&mut self) -> Command {
        loop {
            let (kind, payload) = self.recv().await;
            if kind == MessageKind::Control {
                return Command::parse(&payload).expect("engine sent malformed command");
            }
        }
    }

    /// Receive commands until one named `name` arrives.
    pub async fn expect_command(&mut self, name: &CommandName) -> Command {
        loop {
            let command = self.recv_command().await;
            if &command.command == name {
                return command;
            }
        }
    }

    /// Receive the next data message, skipping control messages.
    pub async fn recv_data(&mut self) -> Bytes {
        loop {
            let (kind, payload) = self.recv().await;
            if kind == MessageKind::Data {
                return payload;
            }
        }
    }

    /// Send a command with `parameters` and a fresh id, returning the id.
    pub async fn send_command(&mut self, name: CommandName, parameters: Value) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        let command = Command {
            command: name,
            id: Some(id),
            parameters,
        };
        self.send_raw(MessageKind::Control, command.to_bytes().expect("encode command"))
            .await;
        id
    }

    /// Send a `version` handshake as a peer of `protocol_version` would.
    ///
    /// Pre-feature-field peers send the legacy fragmentation flag only.
    pub async fn send_version(
        &mut self,
        protocol_version: u32,
        enable_fragmentation: bool,
        features: &[(Feature, bool)],
    ) -> u64 {
        let mut parameters = json!({
            "protocol_version": protocol_version,
            "version": "raw-peer",
        });
        if protocol_version >= 11 {
            parameters["enable_fragmentation"] = json!(enable_fragmentation);
        }
        if protocol_version >= 12 {
            let features: BTreeMap<&str, bool> = features
                .iter()
                .map(|(feature, present)| (feature.as_str(), *present))
                .collect();
            parameters["features"] = json!(features);
        }
        self.send_command(CommandName::VERSION, parameters).await
    }

    /// Send a raw message.
    ///
    /// # Panics
    ///
    /// Panics if the transport refuses the message.
    pub async fn send_raw(&self, kind: MessageKind, payload: Bytes) {
        self.adapter
            .send_message(kind, payload)
            .await
            .expect("send to engine");
    }

    /// Close the peer's side of the transport.
    pub async fn close(&self) { self.adapter.close().await; }
}
