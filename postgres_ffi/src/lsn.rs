//! Log sequence numbers.
//!
//! A `Lsn` is a 64-bit byte position in the WAL stream, split into a
//! high 32-bit "file id" and a low 32-bit intra-file offset, the same
//! split PostgreSQL itself uses for its `%X/%X` textual LSNs.

use std::fmt;
use std::str::FromStr;

use crate::error::{WalError, WalResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct Lsn(pub u64);

impl Lsn {
    pub const INVALID: Lsn = Lsn(0);

    pub fn new(value: u64) -> Self {
        Lsn(value)
    }

    pub fn file_id(&self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub fn offset(&self) -> u32 {
        self.0 as u32
    }

    /// Byte distance to `other`, only defined within the same file id.
    pub fn distance(&self, other: Lsn) -> WalResult<u64> {
        if self.file_id() != other.file_id() {
            return Err(WalError::CrossFileDistance(self.file_id(), other.file_id()));
        }
        Ok((self.offset() as i64 - other.offset() as i64).unsigned_abs())
    }

    /// The LSN of the first byte after the segment containing this one.
    pub fn next_segment(&self, segment_size: usize) -> Lsn {
        let segment_size = segment_size as u64;
        let next_offset = (self.0 / segment_size + 1) * segment_size;
        Lsn(next_offset)
    }

    pub fn is_segment_boundary(&self, segment_size: usize) -> bool {
        self.0 % (segment_size as u64) == 0
    }

    pub fn checked_sub(&self, delta: u64) -> Option<Lsn> {
        self.0.checked_sub(delta).map(Lsn)
    }

    pub fn checked_add(&self, delta: u64) -> Option<Lsn> {
        self.0.checked_add(delta).map(Lsn)
    }
}

impl fmt::Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}/{:X}", self.file_id(), self.offset())
    }
}

impl FromStr for Lsn {
    type Err = WalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (high, low) = s
            .split_once('/')
            .ok_or_else(|| WalError::InvalidLsnText(s.to_string()))?;
        let high = if high.is_empty() {
            0
        } else {
            u32::from_str_radix(high, 16).map_err(|_| WalError::InvalidLsnText(s.to_string()))?
        };
        let low =
            u32::from_str_radix(low, 16).map_err(|_| WalError::InvalidLsnText(s.to_string()))?;
        Ok(Lsn(((high as u64) << 32) | low as u64))
    }
}

impl From<u64> for Lsn {
    fn from(value: u64) -> Self {
        Lsn(value)
    }
}

impl From<Lsn> for u64 {
    fn from(lsn: Lsn) -> Self {
        lsn.0
    }
}
