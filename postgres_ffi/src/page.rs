//! WAL page headers.
//!
//! The segment's first `block_size` bytes are a leading file header
//! (system identifier and declared geometry) with no magic and no page
//! structure of its own — it is not a page in the short-header sense.
//! The page loop's first magic-checked short header begins at the
//! `block_size` boundary, and every page from there on carries one, used
//! for resynchronization (magic) and continuation bookkeeping.

use crate::cursor::ByteCursor;
use crate::error::{SegmentOffset, WalError, WalResult};
use crate::lsn::Lsn;
use crate::pg_constants::{XLOG_PAGE_MAGIC, XLP_FIRST_IS_CONTRECORD};

#[derive(Debug, Clone, Copy)]
pub struct ShortPageHeader {
    pub magic: u16,
    pub info: u16,
    pub timeline: u32,
    pub prev_page_lsn: Lsn,
    pub page_lsn: Lsn,
}

impl ShortPageHeader {
    pub const SIZE: usize = 24;

    pub fn parse(cursor: &mut ByteCursor, page_offset: usize) -> WalResult<Self> {
        let magic = cursor.read_u16()?;
        if magic != XLOG_PAGE_MAGIC {
            return Err(WalError::CorruptPage(SegmentOffset(page_offset)));
        }
        let info = cursor.read_u16()?;
        let timeline = cursor.read_u32()?;
        let prev_page_lsn = Lsn(cursor.read_u64()?);
        let page_lsn = Lsn(cursor.read_u64()?);
        Ok(ShortPageHeader {
            magic,
            info,
            timeline,
            prev_page_lsn,
            page_lsn,
        })
    }

    /// True if this page starts with the continuation of a record begun
    /// on the previous page.
    pub fn is_continuation(&self) -> bool {
        self.info & XLP_FIRST_IS_CONTRECORD != 0
    }
}

/// The segment's leading file header: `{system_identifier, segment_size,
/// block_size, xlog_seg_size}`, 20 bytes, no magic byte. It occupies the
/// whole first `block_size` region of the segment; the page loop does
/// not treat that region as a page at all.
#[derive(Debug, Clone, Copy)]
pub struct LongPageHeader {
    pub system_identifier: u64,
    pub segment_size: u32,
    pub block_size: u32,
    pub xlog_seg_size: u32,
}

impl LongPageHeader {
    pub const SIZE: usize = 20;

    pub fn parse(cursor: &mut ByteCursor) -> WalResult<Self> {
        let system_identifier = cursor.read_u64()?;
        let segment_size = cursor.read_u32()?;
        let block_size = cursor.read_u32()?;
        let xlog_seg_size = cursor.read_u32()?;
        Ok(LongPageHeader {
            system_identifier,
            segment_size,
            block_size,
            xlog_seg_size,
        })
    }
}
