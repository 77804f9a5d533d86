use postgres_ffi::pg_constants::XLOG_PAGE_MAGIC;
use postgres_ffi::{Lsn, SegmentDecoder, WalError};

/// The segment's leading file header: 20 bytes, no magic, not a page.
fn file_header(block_size: u32, segment_size: u32) -> Vec<u8> {
    let mut b = Vec::new();
    b.extend_from_slice(&0xAABBCCDDu64.to_le_bytes());
    b.extend_from_slice(&segment_size.to_le_bytes());
    b.extend_from_slice(&block_size.to_le_bytes());
    b.extend_from_slice(&segment_size.to_le_bytes());
    b
}

fn short_header(page_lsn: u64) -> Vec<u8> {
    let mut b = Vec::new();
    b.extend_from_slice(&XLOG_PAGE_MAGIC.to_le_bytes());
    b.extend_from_slice(&0u16.to_le_bytes());
    b.extend_from_slice(&1u32.to_le_bytes());
    b.extend_from_slice(&0u64.to_le_bytes());
    b.extend_from_slice(&page_lsn.to_le_bytes());
    b
}

fn record_header(total_len: u32, xid: u32, rmid: u8, info: u8) -> Vec<u8> {
    let mut b = Vec::new();
    b.extend_from_slice(&total_len.to_le_bytes());
    b.extend_from_slice(&xid.to_le_bytes());
    b.extend_from_slice(&0u64.to_le_bytes());
    b.push(info);
    b.push(rmid);
    b.extend_from_slice(&0u16.to_le_bytes());
    b.extend_from_slice(&0u32.to_le_bytes());
    b
}

#[test]
fn empty_16mb_segment_yields_zero_records() {
    let block_size = 8192u32;
    let segment_size = 16 * 1024 * 1024u32;
    let mut data = file_header(block_size, segment_size);
    data.resize(segment_size as usize, 0);

    let decoder = SegmentDecoder::from_bytes(data, Lsn(0)).unwrap();
    let records: Vec<_> = decoder.records(None, None).collect();
    assert!(records.is_empty());
}

#[test]
fn record_exactly_filling_remaining_segment_decodes() {
    let block_size = 300u32;
    let segment_size = block_size * 2; // file header region + one page
    let mut data = file_header(block_size, segment_size);
    data.resize(block_size as usize, 0); // leading file-header region
    data.extend_from_slice(&short_header(0));

    let remaining = segment_size as usize - data.len();
    let body_len = remaining - 24;
    let mut body = vec![0xFFu8, (body_len - 2) as u8];
    body.extend(std::iter::repeat(0u8).take(body_len - 2));

    let header = record_header(remaining as u32, 1, 1, 0x00);
    data.extend_from_slice(&header);
    data.extend_from_slice(&body);
    assert_eq!(data.len(), segment_size as usize);

    let decoder = SegmentDecoder::from_bytes(data, Lsn(0)).unwrap();
    let records: Vec<_> = decoder.records(None, None).collect();
    assert_eq!(records.len(), 1);
    assert!(records[0].is_ok());
}

#[test]
fn record_one_byte_longer_than_remaining_segment_is_malformed() {
    let block_size = 512u32;
    let segment_size = block_size * 2;
    let mut data = file_header(block_size, segment_size);
    data.resize(block_size as usize, 0);
    data.extend_from_slice(&short_header(0));

    let remaining = segment_size as usize - data.len();
    let header = record_header((remaining + 1) as u32, 1, 1, 0x00);
    data.extend_from_slice(&header);
    data.resize(segment_size as usize, 0);

    let decoder = SegmentDecoder::from_bytes(data, Lsn(0)).unwrap();
    let records: Vec<_> = decoder.records(None, None).collect();
    assert_eq!(records.len(), 1);
    assert!(matches!(records[0], Err(WalError::MalformedRecord { .. })));
}

#[test]
fn unknown_rmid_renders_as_unknown_with_value() {
    use postgres_ffi::RmgrId;
    assert_eq!(RmgrId::from(99).to_string(), "Unknown(99)");
    assert_eq!(RmgrId::from(0).to_string(), "XLOG");
}

#[test]
fn open_surfaces_io_error_instead_of_corrupt_page() {
    let err = SegmentDecoder::open("/nonexistent/path/to/a.wal", Lsn(0)).unwrap_err();
    assert!(matches!(err, WalError::Io(_)));
}

#[test]
fn open_reads_a_real_segment_from_disk() {
    let block_size = 64u32;
    let segment_size = block_size * 2;
    let mut data = file_header(block_size, segment_size);
    data.resize(block_size as usize, 0);
    data.extend_from_slice(&short_header(0));
    data.extend_from_slice(&record_header(24, 5, 1, 0x00));
    data.resize(segment_size as usize, 0);

    let dir = camino_tempfile::tempdir().unwrap();
    let path = dir.path().join("000000010000000000000001");
    std::fs::write(&path, &data).unwrap();

    let decoder = SegmentDecoder::open(&path, Lsn(0)).unwrap();
    let records: Vec<_> = decoder.records(None, None).map(|r| r.unwrap()).collect();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].xid(), 5);
}
