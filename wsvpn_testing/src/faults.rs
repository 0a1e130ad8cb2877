//! Transport and interface doubles that fail on demand.

use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use bytes::Bytes;
use wsvpn::{
    MessageHandler,
    MessageKind,
    TransportAdapter,
    VirtualInterface,
    adapter::memory::MemoryAdapter,
    error::TransportError,
};

/// Wraps a memory adapter and refuses every send once muted.
///
/// Receiving, readiness and closing are delegated, so a connection keeps
/// running while its outbound messages are lost.
pub struct MutableAdapter {
    inner: Arc<MemoryAdapter>,
    muted: AtomicBool,
    refused: AtomicUsize,
}

impl MutableAdapter {
    pub fn new(inner: Arc<MemoryAdapter>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            muted: AtomicBool::new(false),
            refused: AtomicUsize::new(0),
        })
    }

    /// Make every later send fail with [`TransportError::Closed`].
    pub fn mute(&self) { self.muted.store(true, Ordering::SeqCst); }

    /// Number of sends refused while muted.
    pub fn refused(&self) -> usize { self.refused.load(Ordering::SeqCst) }

    /// The wrapped adapter.
    pub fn inner(&self) -> &Arc<MemoryAdapter> { &self.inner }
}

#[async_trait]
impl TransportAdapter for MutableAdapter {
    async fn serve(&self) -> Result<(), TransportError> { self.inner.serve().await }

    async fn close(&self) { self.inner.close().await; }

    fn set_message_handler(&self, handler: MessageHandler) { self.inner.set_message_handler(handler); }

    async fn wait_ready(&self) { self.inner.wait_ready().await; }

    async fn send_message(&self, kind: MessageKind, payload: Bytes) -> Result<(), TransportError> {
        if self.muted.load(Ordering::SeqCst) {
            self.refused.fetch_add(1, Ordering::SeqCst);
            return Err(TransportError::Closed);
        }
        self.inner.send_message(kind, payload).await
    }

    fn max_message_size(&self) -> Option<usize> { self.inner.max_message_size() }
}

/// A device whose reads panic with a fixed message.
#[derive(Default)]
pub struct PanickingInterface {
    close_count: AtomicUsize,
}

impl PanickingInterface {
    /// Message carried by the read panic.
    pub const PANIC_MESSAGE: &'static str = "device exploded";

    pub fn new() -> Arc<Self> { Arc::new(Self::default()) }

    pub fn close_count(&self) -> usize { self.close_count.load(Ordering::SeqCst) }
}

#[async_trait]
impl VirtualInterface for PanickingInterface {
    async fn read_packet(&self, _buf: &mut [u8]) -> io::Result<usize> { panic!("{}", Self::PANIC_MESSAGE) }

    async fn write_packet(&self, _packet: &[u8]) -> io::Result<()> { Ok(()) }

    async fn close(&self) { self.close_count.fetch_add(1, Ordering::SeqCst); }
}
