//! Best-effort fragmentation of oversized packets.
//!
//! When the negotiated link policy enables fragmentation, every data message
//! starts with a five byte [`FragmentHeader`]. Outbound packets larger than
//! the transport's message limit are split by the [`Fragmenter`] into up to
//! 128 chunks sharing one [`FragmentId`]; inbound chunks are collected in the
//! [`FragmentTable`] until the group is complete. Groups that never complete
//! are evicted after a fixed expiry. There is no retransmission: losing one
//! chunk loses the whole packet.

pub mod error;
pub mod fragmenter;
pub mod header;
pub mod id;
pub mod reassembler;

use std::time::Duration;

pub use error::{FragmentationError, ReassemblyError};
pub use fragmenter::{FragmentBatch, Fragmenter};
pub use header::{FRAGMENT_HEADER_LEN, FragmentHeader};
pub use id::{FragmentId, FragmentIndex};
pub use reassembler::FragmentTable;

/// Age after which an incomplete fragment group is discarded.
pub const FRAGMENT_EXPIRY: Duration = Duration::from_secs(30);

/// Interval between sweeps of the fragment table.
pub const FRAGMENT_CLEANUP_INTERVAL: Duration = FRAGMENT_EXPIRY;
