//! Wire encoding of the per-message fragment header.
//!
//! Layout: `[group id: u32 big-endian][flags+index: u8]`, where the high bit
//! of the final byte marks the terminal chunk and the low seven bits hold
//! the chunk index.

use bytes::{Buf, BufMut, Bytes};

use super::{FragmentId, FragmentIndex, ReassemblyError};

/// Encoded size of a [`FragmentHeader`].
pub const FRAGMENT_HEADER_LEN: usize = 5;

const LAST_FRAGMENT_FLAG: u8 = 0x80;
const INDEX_MASK: u8 = 0x7F;

/// Header carried at the front of every data message while fragmentation is
/// enabled.
///
/// # Examples
///
/// ```
/// use wsvpn::fragment::{FragmentHeader, FragmentId, FragmentIndex};
/// let header = FragmentHeader::new(FragmentId::new(7), FragmentIndex::zero(), true);
/// let mut buf = Vec::new();
/// header.encode(&mut buf);
/// assert_eq!(buf, [0, 0, 0, 7, 0x80]);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FragmentHeader {
    id: FragmentId,
    index: FragmentIndex,
    is_last: bool,
}

impl FragmentHeader {
    /// Create a new fragment header.
    #[must_use]
    pub const fn new(id: FragmentId, index: FragmentIndex, is_last: bool) -> Self {
        Self { id, index, is_last }
    }

    /// Return the group identifier.
    #[must_use]
    pub const fn id(&self) -> FragmentId { self.id }

    /// Return the chunk position within the group.
    #[must_use]
    pub const fn index(&self) -> FragmentIndex { self.index }

    /// Report whether this is the terminal chunk.
    #[must_use]
    pub const fn is_last(&self) -> bool { self.is_last }

    /// Append the encoded header to `buf`.
    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u32(self.id.get());
        let flag = if self.is_last { LAST_FRAGMENT_FLAG } else { 0 };
        buf.put_u8(flag | self.index.get());
    }

    /// Split a data message into its header and chunk payload.
    ///
    /// # Errors
    ///
    /// Returns [`ReassemblyError::Truncated`] when the message is shorter
    /// than [`FRAGMENT_HEADER_LEN`].
    pub fn decode(mut message: Bytes) -> Result<(Self, Bytes), ReassemblyError> {
        if message.len() < FRAGMENT_HEADER_LEN {
            return Err(ReassemblyError::Truncated { len: message.len() });
        }
        let id = FragmentId::new(message.get_u32());
        let raw = message.get_u8();
        let index = FragmentIndex::new(raw & INDEX_MASK).unwrap_or(FragmentIndex::MAX);
        let header = Self::new(id, index, raw & LAST_FRAGMENT_FLAG != 0);
        Ok((header, message))
    }
}
