use derive_more::{Display, From, Into};

/// Identifier shared by every chunk of one fragmented packet.
///
/// # Examples
///
/// ```
/// use wsvpn::fragment::FragmentId;
/// let id = FragmentId::new(42);
/// assert_eq!(id.get(), 42);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From, Into)]
#[display("{_0}")]
pub struct FragmentId(u32);

impl FragmentId {
    /// Create a new identifier.
    #[must_use]
    pub const fn new(value: u32) -> Self { Self(value) }

    /// Return the inner numeric identifier.
    #[must_use]
    pub const fn get(self) -> u32 { self.0 }
}

/// Zero-based position of a chunk within its group.
///
/// Only the low seven bits of the wire byte carry the index, so valid
/// values are `0..=127`.
///
/// # Examples
///
/// ```
/// use wsvpn::fragment::FragmentIndex;
/// assert_eq!(FragmentIndex::new(3).map(FragmentIndex::get), Some(3));
/// assert!(FragmentIndex::new(128).is_none());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[display("{_0}")]
pub struct FragmentIndex(u8);

impl FragmentIndex {
    /// Largest representable index.
    pub const MAX: Self = Self(0x7F);

    /// Construct an index, returning `None` above [`FragmentIndex::MAX`].
    #[must_use]
    pub const fn new(value: u8) -> Option<Self> {
        if value <= Self::MAX.0 {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Return the first valid index.
    #[must_use]
    pub const fn zero() -> Self { Self(0) }

    /// Return the underlying numeric value.
    #[must_use]
    pub const fn get(self) -> u8 { self.0 }

    /// Return the index as a slot position.
    #[must_use]
    pub const fn as_usize(self) -> usize { self.0 as usize }
}

impl TryFrom<usize> for FragmentIndex {
    type Error = usize;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .ok()
            .and_then(Self::new)
            .ok_or(value)
    }
}
