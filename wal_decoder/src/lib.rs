//! Interpretation layer built on `postgres_ffi::Record`: groups records
//! by transaction id and tracks commit/abort/prepare state across
//! subtransactions.

pub mod diagnostic;
pub mod tracker;

pub use diagnostic::TrackerDiagnostic;
pub use tracker::{TransactionInfo, TransactionState, TransactionTracker, TrackerStats};
