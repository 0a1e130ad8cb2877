//! Contract between a connection and the framed transport beneath it.
//!
//! A transport carries two kinds of messages: data messages holding raw
//! (possibly fragment-framed) packets and control messages holding JSON
//! commands. The connection drives the transport through
//! [`TransportAdapter`]; inbound messages are pushed back through the
//! [`MessageHandler`] installed before serving starts.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;

use crate::error::TransportError;

/// Kind of a transport message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// A tunnelled packet.
    Data,
    /// A control command.
    Control,
}

/// Callback receiving every inbound message.
///
/// The transport awaits the returned future before delivering the next
/// message, so messages are handled in arrival order.
pub type MessageHandler = Arc<dyn Fn(MessageKind, Bytes) -> BoxFuture<'static, ()> + Send + Sync>;

/// Bidirectional framed message channel to the peer.
#[async_trait]
pub trait TransportAdapter: Send + Sync + 'static {
    /// Run the receive loop until the transport ends.
    ///
    /// # Errors
    ///
    /// An error means the transport terminated unexpectedly; an orderly
    /// close by either side returns `Ok(())`.
    async fn serve(&self) -> Result<(), TransportError>;

    /// Close the transport. Must be safe to call more than once.
    async fn close(&self);

    /// Install the inbound message callback.
    fn set_message_handler(&self, handler: MessageHandler);

    /// Resolve once the transport can carry messages, or has closed.
    async fn wait_ready(&self);

    /// Send one message to the peer.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] once the transport is closed and
    /// [`TransportError::MessageTooLarge`] if the payload exceeds
    /// [`max_message_size`](Self::max_message_size).
    async fn send_message(&self, kind: MessageKind, payload: Bytes) -> Result<(), TransportError>;

    /// Largest payload a single message may carry, if limited.
    fn max_message_size(&self) -> Option<usize>;
}
