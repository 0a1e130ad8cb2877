#![doc(html_root_url = "https://docs.rs/wsvpn/latest")]
//! Per-connection protocol engine for a WebSocket-tunnelled VPN.
//!
//! A [`Connection`] sits between a framed message transport and a virtual
//! network interface. It negotiates capabilities with the peer across
//! several historical protocol versions, fragments and reassembles packets
//! that exceed the transport's message limit, dispatches JSON control
//! commands and owns the connection lifecycle: readiness, keepalive and
//! idempotent shutdown.
//!
//! Transports, virtual interfaces and the server-side multiplexer plug in
//! through the [`TransportAdapter`], [`VirtualInterface`] and
//! [`PacketHandler`] traits. In-memory implementations of the first two
//! live in [`adapter::memory`] and [`iface::memory`].

pub mod adapter;
pub mod addr;
pub mod command;
pub mod config;
pub mod connection;
pub mod error;
pub mod feature;
pub mod fragment;
pub mod iface;
pub mod metrics;
pub mod panic;
pub mod protocol;
pub mod registry;

pub use adapter::{MessageHandler, MessageKind, TransportAdapter};
pub use command::{Command, CommandError, CommandHandler, CommandName};
pub use config::{ConnectionConfig, PingConfig};
pub use connection::{Connection, ConnectionBuilder};
pub use error::{ConnectionError, Result, TransportError};
pub use feature::{Feature, FeatureRegistry};
pub use iface::{InterfaceHandle, VirtualInterface};
pub use protocol::{CompatibilityBucket, LinkPolicy, ProtocolVersion};
pub use registry::{ConnectionId, PacketHandler, SocketRegistry};
