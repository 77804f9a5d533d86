//! Wire-format layer for PostgreSQL WAL segments: byte-level cursors,
//! LSNs, page headers, and the record/segment decoder built on top of
//! them. `wal_decoder` consumes this crate's `Record` stream to build
//! higher-level transaction state.

pub mod cursor;
pub mod error;
pub mod lsn;
pub mod page;
pub mod pg_constants;
pub mod record;
pub mod segment;

pub use cursor::{ByteCursor, TextEncoding};
pub use error::{WalError, WalResult};
pub use lsn::Lsn;
pub use page::{LongPageHeader, ShortPageHeader};
pub use pg_constants::RmgrId;
pub use record::{BlockImage, BlockReference, BodyEntry, Record, RecordHeader, RelFileNode};
pub use segment::{SegmentDecoder, SegmentLayout};
