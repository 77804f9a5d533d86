//! Non-fatal conditions the tracker surfaces while processing records.
//!
//! None of these abort tracking: a diagnostic is returned alongside the
//! normal `process` call so a caller can log or count it, but the
//! tracker's maps are always left in a consistent state either way.

#[derive(Debug, thiserror::Error)]
pub enum TrackerDiagnostic {
    /// A record arrived for an xid that already reached a terminal
    /// state (`committed`/`aborted`). The record is dropped.
    #[error("record against terminal transaction {xid}")]
    LateRecord { xid: u32 },
    /// `XLOG_XACT_INVALID` (0x60) was observed. The source treats this
    /// as a silent no-op; this tracker surfaces it instead of dropping
    /// it on the floor.
    #[error("XLOG_XACT_INVALID observed for xid {xid}")]
    InvalidOpcode { xid: u32 },
    /// A subtransaction assignment named a parent the tracker has not
    /// seen a record for yet.
    #[error("subxid {subxid} assigned to untracked parent {parent_xid}")]
    OrphanSubxid { parent_xid: u32, subxid: u32 },
    /// The decoder failed to produce a record at all; surfaced through
    /// the same diagnostic channel rather than aborting tracking.
    #[error("segment decode error: {0}")]
    DecodeError(#[from] postgres_ffi::WalError),
}

impl TrackerDiagnostic {
    pub fn xid(&self) -> Option<u32> {
        match self {
            TrackerDiagnostic::LateRecord { xid } => Some(*xid),
            TrackerDiagnostic::InvalidOpcode { xid } => Some(*xid),
            TrackerDiagnostic::OrphanSubxid { parent_xid, .. } => Some(*parent_xid),
            TrackerDiagnostic::DecodeError(_) => None,
        }
    }
}
