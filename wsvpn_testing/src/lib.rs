//! Test helpers for driving `wsvpn` connections in memory.
//!
//! - [`LoggerHandle`] and the [`logger`] fixture capture log records.
//! - [`RawPeer`] speaks the wire protocol by hand, to emulate any peer
//!   version.
//! - [`Loopback`] wires two real connections back to back with memory
//!   interfaces on both ends.
//! - [`RecordingPacketHandler`] records packet handler callbacks.
//! - [`MutableAdapter`] and [`PanickingInterface`] inject transport and
//!   device failures.

pub mod faults;
pub mod logging;
pub mod loopback;
pub mod packet_handler;
pub mod peer;

pub use faults::{MutableAdapter, PanickingInterface};
pub use logging::{LoggerHandle, logger};
pub use loopback::{Loopback, LoopbackSide};
pub use packet_handler::RecordingPacketHandler;
pub use peer::RawPeer;

/// Default time limit for a single awaited step in tests.
pub const STEP_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);
