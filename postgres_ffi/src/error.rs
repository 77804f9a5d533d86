//! Closed error taxonomy for the WAL wire-format layer.
//!
//! Every fallible operation in this crate returns one of these variants;
//! there is no catch-all case. `CorruptPage` is the only variant the
//! segment decoder recovers from locally (see `segment.rs`) — the rest
//! either surface to the caller directly (cursor/LSN errors) or end the
//! current segment's iteration (`MalformedRecord`, `TruncatedRecord`).

use std::fmt;

/// Position of a malformed page or record within its segment, used to make
/// diagnostics actionable without re-deriving the offset at the call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentOffset(pub usize);

impl fmt::Display for SegmentOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WalError {
    #[error("unexpected end of buffer: wanted {wanted} bytes, {available} available")]
    UnexpectedEof { wanted: usize, available: usize },

    #[error("seek position {pos} out of range [0, {len}]")]
    OutOfRange { pos: usize, len: usize },

    #[error("corrupt page at {0}: bad magic")]
    CorruptPage(SegmentOffset),

    #[error("malformed record at {offset}: {reason}")]
    MalformedRecord {
        offset: SegmentOffset,
        reason: &'static str,
    },

    #[error("record at {0} truncated by end of segment")]
    TruncatedRecord(SegmentOffset),

    #[error("invalid LSN text {0:?}")]
    InvalidLsnText(String),

    #[error("cannot compute distance between LSNs in different files ({0} vs {1})")]
    CrossFileDistance(u32, u32),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type WalResult<T> = Result<T, WalError>;
