//! Record header, block-reference, and record-body parsing.
//!
//! A record is a fixed 24-byte prefix followed by a sequence of block
//! references and, usually, a trailing main-data chunk. `parse_body`
//! walks that sequence once the segment decoder has assembled the full
//! `total_len` worth of bytes (possibly stitched across page/segment
//! boundaries).

use crate::cursor::ByteCursor;
use crate::error::{SegmentOffset, WalError, WalResult};
use crate::lsn::Lsn;
use crate::pg_constants::{
    self, BKPBLOCK_FORK_MASK, BKPBLOCK_HAS_DATA, BKPBLOCK_HAS_IMAGE, BKPBLOCK_SAME_REL,
    BKPBLOCK_WILL_INIT, BKPIMAGE_HAS_HOLE, SIZE_OF_XLOG_RECORD, XLR_BLOCK_ID_DATA_LONG,
    XLR_BLOCK_ID_DATA_SHORT, XLR_BLOCK_ID_ORIGIN, XLR_BLOCK_ID_TOPLEVEL_XID,
};

/// The fixed 24-byte record prefix (`total_len, xid, prev_lsn, info, rmid,
/// pad[2], crc`).
#[derive(Debug, Clone, Copy)]
pub struct RecordHeader {
    pub total_len: u32,
    pub xid: u32,
    pub prev_lsn: Lsn,
    pub info: u8,
    pub rmid: u8,
    pub crc: u32,
}

impl RecordHeader {
    pub const SIZE: usize = SIZE_OF_XLOG_RECORD;

    pub fn parse(cursor: &mut ByteCursor) -> WalResult<Self> {
        let total_len = cursor.read_u32()?;
        let xid = cursor.read_u32()?;
        let prev_lsn = Lsn(cursor.read_u64()?);
        let info = cursor.read_u8()?;
        let rmid = cursor.read_u8()?;
        cursor.skip(2)?; // padding
        let crc = cursor.read_u32()?;
        Ok(RecordHeader {
            total_len,
            xid,
            prev_lsn,
            info,
            rmid,
            crc,
        })
    }

    pub fn rmgr_opcode(&self) -> u8 {
        self.info & pg_constants::XLR_RMGR_INFO_MASK
    }

    pub fn is_special_rel_update(&self) -> bool {
        self.info & pg_constants::XLR_SPECIAL_REL_UPDATE != 0
    }

    pub fn is_consistency_check(&self) -> bool {
        self.info & pg_constants::XLR_CHECK_CONSISTENCY != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelFileNode {
    pub spc_node: u32,
    pub db_node: u32,
    pub rel_node: u32,
}

impl RelFileNode {
    pub const SIZE: usize = 12;

    fn parse(cursor: &mut ByteCursor) -> WalResult<Self> {
        Ok(RelFileNode {
            spc_node: cursor.read_u32()?,
            db_node: cursor.read_u32()?,
            rel_node: cursor.read_u32()?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct BlockImage {
    pub len: u16,
    pub hole_offset: u16,
    pub bimg_info: u8,
    pub hole_length: u16,
    pub data: Vec<u8>,
}

impl BlockImage {
    pub fn has_hole(&self) -> bool {
        self.bimg_info & BKPIMAGE_HAS_HOLE != 0
    }

    pub fn is_compressed(&self) -> bool {
        pg_constants::bkpimage_is_compressed(self.bimg_info)
    }

    pub fn should_apply(&self) -> bool {
        self.bimg_info & pg_constants::BKPIMAGE_APPLY != 0
    }
}

#[derive(Debug, Clone)]
pub struct BlockReference {
    pub id: u8,
    pub fork_flags: u8,
    pub data_len: u16,
    pub image: Option<BlockImage>,
    pub rel_node: Option<RelFileNode>,
    pub block_num: u32,
    pub data: Option<Vec<u8>>,
}

impl BlockReference {
    pub fn fork_num(&self) -> u8 {
        self.fork_flags & BKPBLOCK_FORK_MASK
    }

    pub fn has_image(&self) -> bool {
        self.fork_flags & BKPBLOCK_HAS_IMAGE != 0
    }

    pub fn has_data(&self) -> bool {
        self.fork_flags & BKPBLOCK_HAS_DATA != 0
    }

    pub fn will_init(&self) -> bool {
        self.fork_flags & BKPBLOCK_WILL_INIT != 0
    }

    pub fn same_rel(&self) -> bool {
        self.fork_flags & BKPBLOCK_SAME_REL != 0
    }
}

/// One parsed entry of the record body, in encounter order. Mirrors the
/// tag byte that introduces each entry on the wire.
#[derive(Debug, Clone)]
pub enum BodyEntry {
    BlockRef(BlockReference),
    ShortMainData(Vec<u8>),
    LongMainData(Vec<u8>),
    OriginMarker,
    TopXidMarker,
}

#[derive(Debug, Clone)]
pub struct Record {
    pub header: RecordHeader,
    pub start_offset: usize,
    /// The record's own address in the WAL stream: the segment's base
    /// LSN (taken from page 0's header) plus `start_offset`.
    pub lsn: Lsn,
    pub entries: Vec<BodyEntry>,
}

impl Record {
    pub fn rmid(&self) -> u8 {
        self.header.rmid
    }

    pub fn xid(&self) -> u32 {
        self.header.xid
    }

    pub fn prev_lsn(&self) -> Lsn {
        self.header.prev_lsn
    }

    pub fn block_refs(&self) -> impl Iterator<Item = &BlockReference> {
        self.entries.iter().filter_map(|e| match e {
            BodyEntry::BlockRef(b) => Some(b),
            _ => None,
        })
    }

    pub fn main_data(&self) -> Option<&[u8]> {
        self.entries.iter().find_map(|e| match e {
            BodyEntry::ShortMainData(d) | BodyEntry::LongMainData(d) => Some(d.as_slice()),
            _ => None,
        })
    }

    /// CRC verification hook. The design exposes the field but does not
    /// mandate validation; no caller in this crate invokes this.
    pub fn verify_crc(&self, body: &[u8]) -> bool {
        let mut crc = 0u32;
        crc = crc32c::crc32c_append(crc, body);
        crc = crc32c::crc32c_append(
            crc,
            &[
                self.header.info,
                self.header.rmid,
                0,
                0,
            ],
        );
        crc == self.header.crc
    }
}

/// Parses the block-reference / main-data sequence making up a record's
/// body, given the full assembled body bytes (prefix already stripped)
/// and the record's start offset within the segment, for diagnostics.
pub fn parse_body(body: &[u8], record_start: usize) -> WalResult<Vec<BodyEntry>> {
    let mut cursor = ByteCursor::new(body);
    let mut entries = Vec::new();
    let mut got_rel_node: Option<RelFileNode> = None;

    while !cursor.is_eof() {
        let tag = cursor.read_u8()?;
        match tag {
            XLR_BLOCK_ID_DATA_SHORT => {
                let len = cursor.read_u8()? as usize;
                let data = cursor.read_bytes(len)?.to_vec();
                entries.push(BodyEntry::ShortMainData(data));
                break;
            }
            XLR_BLOCK_ID_DATA_LONG => {
                let len = cursor.read_u32()? as usize;
                let data = cursor.read_bytes(len)?.to_vec();
                entries.push(BodyEntry::LongMainData(data));
                break;
            }
            XLR_BLOCK_ID_ORIGIN => {
                cursor.skip(2)?;
                entries.push(BodyEntry::OriginMarker);
            }
            XLR_BLOCK_ID_TOPLEVEL_XID => {
                cursor.skip(4)?;
                entries.push(BodyEntry::TopXidMarker);
            }
            id => {
                let fork_flags = cursor.read_u8()?;
                let data_len = cursor.read_u16()?;

                let image = if fork_flags & BKPBLOCK_HAS_IMAGE != 0 {
                    let len = cursor.read_u16()?;
                    let hole_offset = cursor.read_u16()?;
                    let bimg_info = cursor.read_u8()?;
                    let hole_length = if bimg_info & BKPIMAGE_HAS_HOLE != 0
                        && pg_constants::bkpimage_is_compressed(bimg_info)
                    {
                        cursor.read_u16()?
                    } else {
                        0
                    };
                    let data = cursor.read_bytes(len as usize)?.to_vec();
                    Some(BlockImage {
                        len,
                        hole_offset,
                        bimg_info,
                        hole_length,
                        data,
                    })
                } else {
                    None
                };

                let rel_node = if fork_flags & BKPBLOCK_SAME_REL == 0 {
                    let node = RelFileNode::parse(&mut cursor)?;
                    got_rel_node = Some(node);
                    Some(node)
                } else {
                    if got_rel_node.is_none() {
                        return Err(WalError::MalformedRecord {
                            offset: SegmentOffset(record_start),
                            reason: "same_rel set but no previous relation node",
                        });
                    }
                    None
                };

                let block_num = cursor.read_u32()?;

                let data = if fork_flags & BKPBLOCK_HAS_DATA != 0 {
                    Some(cursor.read_bytes(data_len as usize)?.to_vec())
                } else {
                    None
                };

                entries.push(BodyEntry::BlockRef(BlockReference {
                    id,
                    fork_flags,
                    data_len,
                    image,
                    rel_node,
                    block_num,
                    data,
                }));
            }
        }
    }

    Ok(entries)
}
