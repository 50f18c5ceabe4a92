//! Segment and record identifiers.

use crate::error::{CoreError, CoreResult};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier of an immutable storage segment.
///
/// Segment IDs are opaque 128-bit values. They order as big-endian
/// unsigned integers, so `msb` decides before `lsb`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentId([u8; 16]);

impl SegmentId {
    /// Creates a segment ID from raw bytes.
    #[inline]
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Creates a segment ID from a 128-bit integer.
    #[inline]
    #[must_use]
    pub const fn from_u128(value: u128) -> Self {
        Self(value.to_be_bytes())
    }

    /// Creates a segment ID from its most and least significant halves.
    #[inline]
    #[must_use]
    pub const fn from_parts(msb: u64, lsb: u64) -> Self {
        Self::from_u128(((msb as u128) << 64) | lsb as u128)
    }

    /// Creates a new random segment ID.
    #[must_use]
    pub fn new_random() -> Self {
        Self(Uuid::new_v4().into_bytes())
    }

    /// Creates a segment ID from a slice.
    ///
    /// Fails with [`CoreError::InvalidArgument`] unless the slice is exactly
    /// 16 bytes long.
    pub fn from_slice(slice: &[u8]) -> CoreResult<Self> {
        let bytes: [u8; 16] = slice.try_into().map_err(|_| {
            CoreError::invalid_argument(format!(
                "segment id needs 16 bytes, got {}",
                slice.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    /// Returns the raw bytes.
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Returns the ID as a 128-bit integer.
    #[inline]
    #[must_use]
    pub const fn as_u128(&self) -> u128 {
        u128::from_be_bytes(self.0)
    }

    /// Most significant 64 bits.
    #[inline]
    #[must_use]
    pub const fn msb(&self) -> u64 {
        (self.as_u128() >> 64) as u64
    }

    /// Least significant 64 bits.
    #[inline]
    #[must_use]
    pub const fn lsb(&self) -> u64 {
        self.as_u128() as u64
    }

    /// Converts to a UUID.
    #[must_use]
    pub fn to_uuid(&self) -> Uuid {
        Uuid::from_bytes(self.0)
    }
}

impl fmt::Debug for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SegmentId({})", self.to_uuid())
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_uuid())
    }
}

impl FromStr for SegmentId {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        Uuid::parse_str(s)
            .map(|uuid| Self(uuid.into_bytes()))
            .map_err(|e| CoreError::invalid_argument(format!("segment id {s:?}: {e}")))
    }
}

impl From<Uuid> for SegmentId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid.into_bytes())
    }
}

impl From<SegmentId> for Uuid {
    fn from(id: SegmentId) -> Self {
        id.to_uuid()
    }
}

/// Identifier of a record: its segment plus the offset inside that segment.
///
/// Record IDs order by `(segment, offset)`, which is also the iteration
/// order of every map keyed by them in this crate.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId {
    segment: SegmentId,
    offset: u32,
}

impl RecordId {
    /// Creates a record ID.
    #[inline]
    #[must_use]
    pub const fn new(segment: SegmentId, offset: u32) -> Self {
        Self { segment, offset }
    }

    /// Returns the owning segment.
    #[inline]
    #[must_use]
    pub const fn segment(&self) -> SegmentId {
        self.segment
    }

    /// Returns the offset inside the segment.
    #[inline]
    #[must_use]
    pub const fn offset(&self) -> u32 {
        self.offset
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({}:{})", self.segment, self.offset)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.segment, self.offset)
    }
}

impl FromStr for RecordId {
    type Err = CoreError;

    /// Parses the `<segment-uuid>:<offset>` form produced by `Display`.
    fn from_str(s: &str) -> CoreResult<Self> {
        let (segment, offset) = s
            .rsplit_once(':')
            .ok_or_else(|| CoreError::invalid_argument(format!("record id {s:?}: missing ':'")))?;
        let offset = offset
            .parse::<u32>()
            .map_err(|e| CoreError::invalid_argument(format!("record id {s:?}: {e}")))?;
        Ok(Self::new(segment.parse()?, offset))
    }
}
