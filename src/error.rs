//! Canonical error and result types for the crate.
//!
//! Each concern owns a narrow `thiserror` enum next to its code; this module
//! defines the transport error surface and the [`ConnectionError`] that the
//! lifecycle controller funnels every fatal condition through.

use std::{io, time::Duration};

use thiserror::Error;

use crate::{
    command::CommandError,
    fragment::{FragmentationError, ReassemblyError},
    protocol::NegotiationError,
};

/// Errors reported by a [`TransportAdapter`](crate::adapter::TransportAdapter).
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport has been closed, locally or by the peer.
    #[error("transport closed")]
    Closed,
    /// The message exceeds the largest payload the transport can carry.
    #[error("message of {size} bytes exceeds transport limit of {limit} bytes")]
    MessageTooLarge { size: usize, limit: usize },
    /// The transport is already running its serve loop.
    #[error("transport is already serving")]
    AlreadyServing,
    /// An I/O failure in the underlying channel.
    #[error("transport i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Top-level error type for a tunnel connection.
///
/// Anything that reaches [`Connection::close_error`](crate::connection::Connection::close_error)
/// is one of these; its `Display` text is what the peer receives in the
/// best-effort `error` command.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// `serve` was called on a connection that is already serving.
    #[error("connection is already serving")]
    AlreadyServing,
    /// The connection was closed while the operation was pending.
    #[error("connection closed")]
    Closed,
    /// The underlying transport failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// A control command could not be encoded, decoded or handled.
    #[error(transparent)]
    Command(#[from] CommandError),
    /// The peer's handshake could not be negotiated.
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),
    /// An outbound packet could not be split into fragments.
    #[error(transparent)]
    Fragmentation(#[from] FragmentationError),
    /// An inbound fragment could not be reassembled.
    #[error(transparent)]
    Reassembly(#[from] ReassemblyError),
    /// A packet is too large for the transport and fragmentation is off.
    #[error("packet of {size} bytes exceeds transport limit of {limit} bytes")]
    PacketTooLarge { size: usize, limit: usize },
    /// Reading from or writing to the virtual interface failed.
    #[error("interface error: {0}")]
    Interface(#[source] io::Error),
    /// The peer stopped answering keepalive pings.
    #[error("ping timeout: no pong received within {0:?}")]
    PingTimeout(Duration),
    /// A background worker panicked.
    #[error("worker panicked: {0}")]
    WorkerPanic(String),
}

/// Result alias used by connection-level APIs.
pub type Result<T, E = ConnectionError> = std::result::Result<T, E>;
