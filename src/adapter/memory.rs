//! In-process transport built on tokio channels.
//!
//! [`pair`] returns two adapters wired back to back, which is enough to run
//! two connections against each other in tests and in the loopback demo.

use std::{
    io,
    sync::{
        Arc,
        Mutex,
        RwLock,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use bytes::Bytes;
use log::debug;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use super::{MessageHandler, MessageKind, TransportAdapter};
use crate::error::TransportError;

type Message = (MessageKind, Bytes);

/// One end of an in-memory transport.
pub struct MemoryAdapter {
    name: &'static str,
    tx: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<Message>>>,
    handler: RwLock<Option<MessageHandler>>,
    ready: watch::Sender<bool>,
    closed: CancellationToken,
    failed: CancellationToken,
    max_message_size: Option<usize>,
    close_count: AtomicUsize,
}

/// Create two connected adapters sharing the same message size limit.
#[must_use]
pub fn pair(max_message_size: Option<usize>) -> (Arc<MemoryAdapter>, Arc<MemoryAdapter>) {
    let (left_tx, right_rx) = mpsc::unbounded_channel();
    let (right_tx, left_rx) = mpsc::unbounded_channel();
    (
        Arc::new(MemoryAdapter::new("left", left_tx, left_rx, max_message_size)),
        Arc::new(MemoryAdapter::new("right", right_tx, right_rx, max_message_size)),
    )
}

impl MemoryAdapter {
    fn new(
        name: &'static str,
        tx: mpsc::UnboundedSender<Message>,
        rx: mpsc::UnboundedReceiver<Message>,
        max_message_size: Option<usize>,
    ) -> Self {
        Self {
            name,
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(Some(rx)),
            handler: RwLock::new(None),
            ready: watch::channel(false).0,
            closed: CancellationToken::new(),
            failed: CancellationToken::new(),
            max_message_size,
            close_count: AtomicUsize::new(0),
        }
    }

    /// Make [`serve`](TransportAdapter::serve) end with an I/O error, as a
    /// dropped network link would.
    pub fn fail(&self) { self.failed.cancel(); }

    /// Number of times [`close`](TransportAdapter::close) was called.
    #[must_use]
    pub fn close_count(&self) -> usize { self.close_count.load(Ordering::SeqCst) }

    #[must_use]
    pub fn is_closed(&self) -> bool { self.closed.is_cancelled() }

    fn current_handler(&self) -> Option<MessageHandler> {
        self.handler.read().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl TransportAdapter for MemoryAdapter {
    async fn serve(&self) -> Result<(), TransportError> {
        let mut rx = self
            .rx
            .lock()
            .expect("lock poisoned")
            .take()
            .ok_or(TransportError::AlreadyServing)?;
        self.ready.send_replace(true);
        loop {
            let message = tokio::select! {
                biased;
                () = self.closed.cancelled() => return Ok(()),
                () = self.failed.cancelled() => {
                    return Err(TransportError::Io(io::Error::new(
                        io::ErrorKind::ConnectionReset,
                        "memory transport failed",
                    )));
                }
                message = rx.recv() => message,
            };
            let Some((kind, payload)) = message else {
                debug!("memory transport peer hung up: side={}", self.name);
                return Ok(());
            };
            match self.current_handler() {
                Some(handler) => handler(kind, payload).await,
                None => debug!("memory transport dropped message without handler: side={}", self.name),
            }
        }
    }

    async fn close(&self) {
        self.close_count.fetch_add(1, Ordering::SeqCst);
        self.closed.cancel();
        self.tx.lock().expect("lock poisoned").take();
        self.ready.send_replace(true);
    }

    fn set_message_handler(&self, handler: MessageHandler) {
        *self.handler.write().expect("lock poisoned") = Some(handler);
    }

    async fn wait_ready(&self) {
        let mut ready = self.ready.subscribe();
        let _ = ready.wait_for(|ready| *ready).await;
    }

    async fn send_message(&self, kind: MessageKind, payload: Bytes) -> Result<(), TransportError> {
        if let Some(limit) = self.max_message_size
            && payload.len() > limit
        {
            return Err(TransportError::MessageTooLarge {
                size: payload.len(),
                limit,
            });
        }
        let tx = self
            .tx
            .lock()
            .expect("lock poisoned")
            .clone()
            .ok_or(TransportError::Closed)?;
        tx.send((kind, payload)).map_err(|_| TransportError::Closed)
    }

    fn max_message_size(&self) -> Option<usize> { self.max_message_size }
}

impl std::fmt::Debug for MemoryAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryAdapter")
            .field("side", &self.name)
            .field("closed", &self.is_closed())
            .field("max_message_size", &self.max_message_size)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::FutureExt;
    use tokio::sync::mpsc::unbounded_channel;

    use super::*;

    fn forward_to(tx: mpsc::UnboundedSender<Message>) -> MessageHandler {
        Arc::new(move |kind: MessageKind, payload: Bytes| {
            let _ = tx.send((kind, payload));
            async {}.boxed()
        })
    }

    #[tokio::test]
    async fn messages_cross_the_pair_in_order() {
        let (left, right) = pair(None);
        let (seen_tx, mut seen_rx) = unbounded_channel();
        right.set_message_handler(forward_to(seen_tx));
        let server = tokio::spawn({
            let right = right.clone();
            async move { right.serve().await }
        });
        right.wait_ready().await;

        left.send_message(MessageKind::Control, Bytes::from_static(b"a"))
            .await
            .expect("send control");
        left.send_message(MessageKind::Data, Bytes::from_static(b"b"))
            .await
            .expect("send data");

        assert_eq!(
            seen_rx.recv().await,
            Some((MessageKind::Control, Bytes::from_static(b"a")))
        );
        assert_eq!(
            seen_rx.recv().await,
            Some((MessageKind::Data, Bytes::from_static(b"b")))
        );

        left.close().await;
        let result = tokio::time::timeout(Duration::from_secs(1), server)
            .await
            .expect("serve ends after peer hang-up")
            .expect("serve task");
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn oversized_messages_are_refused() {
        let (left, _right) = pair(Some(4));
        let err = left
            .send_message(MessageKind::Data, Bytes::from_static(b"12345"))
            .await
            .expect_err("too large");
        assert!(matches!(
            err,
            TransportError::MessageTooLarge { size: 5, limit: 4 }
        ));
    }

    #[tokio::test]
    async fn closed_adapter_refuses_sends_and_serves() {
        let (left, _right) = pair(None);
        left.close().await;
        left.close().await;
        assert_eq!(left.close_count(), 2);
        assert!(matches!(
            left.send_message(MessageKind::Data, Bytes::new()).await,
            Err(TransportError::Closed)
        ));
        assert!(left.serve().await.is_ok());
        assert!(matches!(left.serve().await, Err(TransportError::AlreadyServing)));
    }

    #[tokio::test]
    async fn failure_surfaces_as_unexpected_termination() {
        let (left, _right) = pair(None);
        left.fail();
        assert!(matches!(left.serve().await, Err(TransportError::Io(_))));
    }
}
