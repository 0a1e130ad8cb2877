//! Error types emitted by the fragmentation layer.
//!
//! Neither enum is fatal to a connection: an outbound error drops the one
//! packet, an inbound error drops the affected group.

use thiserror::Error;

use super::{FragmentId, FragmentIndex};

/// Errors produced while splitting outbound packets.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum FragmentationError {
    /// The transport limit leaves no room for chunk payload after the header.
    #[error("transport limit of {limit} bytes cannot carry a fragment header")]
    LimitTooSmall { limit: usize },
    /// The packet would need more chunks than the header can index.
    #[error("packet of {size} bytes needs {chunks} fragments, more than the 128 allowed")]
    TooManyChunks { size: usize, chunks: usize },
}

/// Errors produced while reassembling inbound chunks.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum ReassemblyError {
    /// The data message is too short to hold a fragment header.
    #[error("data message of {len} bytes is too short for a fragment header")]
    Truncated { len: usize },
    /// A chunk arrived with an index past the group's terminal chunk.
    #[error("fragment {index} of group {id} lies beyond terminal fragment {last}")]
    IndexBeyondTerminal {
        id: FragmentId,
        index: FragmentIndex,
        last: FragmentIndex,
    },
    /// Two different chunks of the same group both claimed to be terminal.
    #[error("group {id} received conflicting terminal fragments {first} and {second}")]
    ConflictingTerminal {
        id: FragmentId,
        first: FragmentIndex,
        second: FragmentIndex,
    },
}
