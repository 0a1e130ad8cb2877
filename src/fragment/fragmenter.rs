//! Outbound helper that splits packets into transport-sized chunks.
//!
//! [`Fragmenter`] owns the connection's group identifier counter and turns a
//! packet into a [`FragmentBatch`]: an ordered list of data messages, each
//! already prefixed with its [`FragmentHeader`].

use std::sync::atomic::{AtomicU32, Ordering};

use bytes::{BufMut, Bytes, BytesMut};

use super::{FRAGMENT_HEADER_LEN, FragmentHeader, FragmentId, FragmentIndex, FragmentationError};

/// Largest number of chunks a single packet may be split into.
pub const MAX_FRAGMENTS: usize = FragmentIndex::MAX.as_usize() + 1;

/// Splits packets into fragment-framed data messages.
#[derive(Debug, Default)]
pub struct Fragmenter {
    last_id: AtomicU32,
}

impl Fragmenter {
    /// Create a fragmenter whose first group id is `1`.
    #[must_use]
    pub const fn new() -> Self { Self::with_last_id(FragmentId::new(0)) }

    /// Create a fragmenter that continues after `last_id`.
    #[must_use]
    pub const fn with_last_id(last_id: FragmentId) -> Self {
        Self {
            last_id: AtomicU32::new(last_id.get()),
        }
    }

    /// Allocate the next group identifier, wrapping at `u32::MAX`.
    #[must_use]
    pub fn next_id(&self) -> FragmentId {
        let previous = self.last_id.fetch_add(1, Ordering::Relaxed);
        FragmentId::new(previous.wrapping_add(1))
    }

    /// Split `packet` into messages no larger than `max_message_size`.
    ///
    /// `None` means the transport has no limit, so the packet travels as a
    /// single terminal chunk. An empty packet also yields one chunk.
    ///
    /// # Errors
    ///
    /// Returns [`FragmentationError::LimitTooSmall`] when the limit cannot
    /// fit a header plus one payload byte, and
    /// [`FragmentationError::TooManyChunks`] when more than
    /// [`MAX_FRAGMENTS`] chunks would be needed. No id is consumed on error.
    pub fn fragment(
        &self,
        packet: &[u8],
        max_message_size: Option<usize>,
    ) -> Result<FragmentBatch, FragmentationError> {
        let chunk_size = match max_message_size {
            None => packet.len().max(1),
            Some(limit) => limit
                .checked_sub(FRAGMENT_HEADER_LEN)
                .filter(|available| *available > 0)
                .ok_or(FragmentationError::LimitTooSmall { limit })?,
        };
        let chunks = packet.len().div_ceil(chunk_size).max(1);
        if chunks > MAX_FRAGMENTS {
            return Err(FragmentationError::TooManyChunks {
                size: packet.len(),
                chunks,
            });
        }

        let id = self.next_id();
        let mut messages = Vec::with_capacity(chunks);
        let mut pieces = packet.chunks(chunk_size);
        for position in 0..chunks {
            let piece = pieces.next().unwrap_or_default();
            let index = FragmentIndex::try_from(position)
                .map_err(|_| FragmentationError::TooManyChunks {
                    size: packet.len(),
                    chunks,
                })?;
            let header = FragmentHeader::new(id, index, position + 1 == chunks);
            let mut buf = BytesMut::with_capacity(FRAGMENT_HEADER_LEN + piece.len());
            header.encode(&mut buf);
            buf.put_slice(piece);
            messages.push(buf.freeze());
        }
        Ok(FragmentBatch { id, messages })
    }
}

/// Data messages produced for a single packet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FragmentBatch {
    id: FragmentId,
    messages: Vec<Bytes>,
}

impl FragmentBatch {
    /// Return the group identifier shared by all messages.
    #[must_use]
    pub const fn id(&self) -> FragmentId { self.id }

    /// Borrow the encoded messages in send order.
    #[must_use]
    pub fn messages(&self) -> &[Bytes] { &self.messages }

    /// Number of messages in the batch.
    #[expect(
        clippy::len_without_is_empty,
        reason = "batches always hold at least one message"
    )]
    #[must_use]
    pub fn len(&self) -> usize { self.messages.len() }

    /// Whether the packet needed more than one message.
    #[must_use]
    pub fn is_fragmented(&self) -> bool { self.messages.len() > 1 }
}

impl IntoIterator for FragmentBatch {
    type Item = Bytes;
    type IntoIter = std::vec::IntoIter<Bytes>;

    fn into_iter(self) -> Self::IntoIter { self.messages.into_iter() }
}
