//! Channel-backed virtual interface.
//!
//! [`MemoryInterface::with_tap`] returns the interface handed to a connection and
//! an [`InterfaceTap`] standing in for the operating system's side of the
//! device: frames injected through the tap are read by the connection, and
//! frames the connection writes arrive at the tap.

use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use super::VirtualInterface;

/// In-memory [`VirtualInterface`].
#[derive(Debug)]
pub struct MemoryInterface {
    inbound: Mutex<mpsc::UnboundedReceiver<Bytes>>,
    outbound: mpsc::UnboundedSender<Bytes>,
    closed: CancellationToken,
    close_count: AtomicUsize,
}

/// The device side of a [`MemoryInterface`].
#[derive(Debug)]
pub struct InterfaceTap {
    to_engine: mpsc::UnboundedSender<Bytes>,
    from_engine: mpsc::UnboundedReceiver<Bytes>,
}

impl MemoryInterface {
    /// Create an interface and its tap.
    #[must_use]
    pub fn with_tap() -> (Arc<Self>, InterfaceTap) {
        let (to_engine, inbound) = mpsc::unbounded_channel();
        let (outbound, from_engine) = mpsc::unbounded_channel();
        let iface = Arc::new(Self {
            inbound: Mutex::new(inbound),
            outbound,
            closed: CancellationToken::new(),
            close_count: AtomicUsize::new(0),
        });
        (
            iface,
            InterfaceTap {
                to_engine,
                from_engine,
            },
        )
    }

    /// Number of times [`close`](VirtualInterface::close) was called.
    #[must_use]
    pub fn close_count(&self) -> usize { self.close_count.load(Ordering::SeqCst) }

    #[must_use]
    pub fn is_closed(&self) -> bool { self.closed.is_cancelled() }
}

fn closed_error() -> io::Error { io::Error::new(io::ErrorKind::BrokenPipe, "interface closed") }

#[async_trait]
impl VirtualInterface for MemoryInterface {
    async fn read_packet(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut inbound = self.inbound.lock().await;
        let packet = tokio::select! {
            () = self.closed.cancelled() => return Err(closed_error()),
            packet = inbound.recv() => packet.ok_or_else(|| {
                io::Error::new(io::ErrorKind::UnexpectedEof, "interface tap dropped")
            })?,
        };
        // Oversized frames are truncated, as a real device read would.
        let len = packet.len().min(buf.len());
        buf[..len].copy_from_slice(&packet[..len]);
        Ok(len)
    }

    async fn write_packet(&self, packet: &[u8]) -> io::Result<()> {
        if self.closed.is_cancelled() {
            return Err(closed_error());
        }
        self.outbound
            .send(Bytes::copy_from_slice(packet))
            .map_err(|_| closed_error())
    }

    async fn close(&self) {
        self.close_count.fetch_add(1, Ordering::SeqCst);
        self.closed.cancel();
    }
}

impl InterfaceTap {
    /// Hand a frame to the connection as if the OS had routed it into the
    /// device.
    ///
    /// Returns `false` once the interface has been dropped.
    pub fn inject(&self, packet: impl Into<Bytes>) -> bool { self.to_engine.send(packet.into()).is_ok() }

    /// Receive the next frame written by the connection.
    pub async fn recv(&mut self) -> Option<Bytes> { self.from_engine.recv().await }

    /// Take a written frame if one is already queued.
    pub fn try_recv(&mut self) -> Option<Bytes> { self.from_engine.try_recv().ok() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_flow_both_ways() {
        let (iface, mut tap) = MemoryInterface::with_tap();
        assert!(tap.inject(Bytes::from_static(b"from os")));
        let mut buf = [0_u8; 32];
        let len = iface.read_packet(&mut buf).await.expect("read frame");
        assert_eq!(&buf[..len], b"from os");

        iface.write_packet(b"to os").await.expect("write frame");
        assert_eq!(tap.recv().await.as_deref(), Some(b"to os".as_slice()));
    }

    #[tokio::test]
    async fn reads_truncate_to_buffer() {
        let (iface, tap) = MemoryInterface::with_tap();
        tap.inject(vec![7_u8; 10]);
        let mut buf = [0_u8; 4];
        assert_eq!(iface.read_packet(&mut buf).await.expect("read"), 4);
    }

    #[tokio::test]
    async fn closed_interface_fails_io() {
        let (iface, _tap) = MemoryInterface::with_tap();
        iface.close().await;
        let mut buf = [0_u8; 4];
        assert_eq!(
            iface.read_packet(&mut buf).await.expect_err("read").kind(),
            io::ErrorKind::BrokenPipe
        );
        assert!(iface.write_packet(b"x").await.is_err());
        assert_eq!(iface.close_count(), 1);
    }
}
