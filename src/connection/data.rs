//! Data message path between the transport and the virtual interface.

use std::sync::Arc;

use bytes::Bytes;
use log::{debug, warn};
use tokio::time::{MissedTickBehavior, interval};

use super::Connection;
use crate::{
    adapter::MessageKind,
    error::{ConnectionError, Result, TransportError},
    fragment::FragmentHeader,
    iface::VirtualInterface,
    metrics::{self, Direction},
};

impl Connection {
    /// Handle one inbound data message.
    ///
    /// With fragmentation on, the message is a fragment and only a completed
    /// group produces a packet. Packets go to the packet handler first and
    /// to the virtual interface if the handler did not consume them.
    pub(super) async fn handle_data(&self, payload: Bytes) {
        let packet = if self.link_policy().fragmentation {
            let accepted = FragmentHeader::decode(payload)
                .and_then(|(header, chunk)| self.fragments.accept(header, chunk));
            match accepted {
                Ok(Some(packet)) => packet,
                Ok(None) => return,
                Err(e) => {
                    warn!("dropping fragment: id={}, error={e}", self.id);
                    return;
                }
            }
        } else {
            payload
        };
        metrics::inc_packets(Direction::Inbound);
        self.deliver_packet(&packet).await;
    }

    async fn deliver_packet(&self, packet: &[u8]) {
        if let Some(handler) = &self.packet_handler
            && handler.handle_packet(self, packet).await
        {
            return;
        }
        if let Some(handle) = &self.iface
            && let Err(e) = handle.iface().write_packet(packet).await
        {
            warn!(
                "failed to write packet to interface: id={}, len={}, error={e}",
                self.id,
                packet.len()
            );
        }
    }

    /// Send one packet to the peer.
    ///
    /// With fragmentation on, every data message carries a fragment header
    /// and packets larger than the transport limit are split.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::PacketTooLarge`] for an oversized packet
    /// without fragmentation, a fragmentation error if it cannot be split
    /// and a transport error if sending fails.
    pub async fn send_packet(&self, packet: &[u8]) -> Result<()> {
        let limit = self.adapter.max_message_size();
        if self.link_policy().fragmentation {
            let batch = self.fragmenter.fragment(packet, limit)?;
            for message in batch {
                self.adapter.send_message(MessageKind::Data, message).await?;
            }
        } else {
            if let Some(limit) = limit
                && packet.len() > limit
            {
                return Err(ConnectionError::PacketTooLarge {
                    size: packet.len(),
                    limit,
                });
            }
            self.adapter
                .send_message(MessageKind::Data, Bytes::copy_from_slice(packet))
                .await?;
        }
        metrics::inc_packets(Direction::Outbound);
        Ok(())
    }

    pub(super) async fn run_interface_reader(self: Arc<Self>, iface: Arc<dyn VirtualInterface>) {
        tokio::select! {
            biased;
            () = self.shutdown.cancelled() => return,
            () = self.wait_ready() => {}
        }
        let mut buf = vec![0_u8; self.config.packet_buffer_size];
        loop {
            let read = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => return,
                read = iface.read_packet(&mut buf) => read,
            };
            let len = match read {
                Ok(len) => len,
                Err(e) => {
                    self.close_error(ConnectionError::Interface(e)).await;
                    return;
                }
            };
            match self.send_packet(&buf[..len]).await {
                Ok(()) => {}
                Err(ConnectionError::Transport(TransportError::Closed)) => return,
                Err(e) => warn!("dropping outbound packet: id={}, len={len}, error={e}", self.id),
            }
        }
    }

    pub(super) async fn run_fragment_cleanup(self: Arc<Self>) {
        let period = self.config.fragment_cleanup_interval;
        if period.is_zero() {
            warn!("fragment cleanup disabled by zero interval: id={}", self.id);
            return;
        }
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => return,
                _ = ticker.tick() => {}
            }
            let evicted = self.fragments.purge_expired();
            if !evicted.is_empty() {
                debug!(
                    "evicted incomplete fragment groups: id={}, groups={evicted:?}",
                    self.id
                );
                metrics::inc_fragments_evicted(evicted.len());
            }
        }
    }
}
