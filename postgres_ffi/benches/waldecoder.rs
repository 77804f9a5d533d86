use criterion::{black_box, criterion_group, criterion_main, Criterion};
use postgres_ffi::pg_constants::{XLOG_BLCKSZ, XLOG_PAGE_MAGIC};
use postgres_ffi::{Lsn, SegmentDecoder};

const BLOCK_SIZE: usize = XLOG_BLCKSZ;
const SEGMENT_SIZE: usize = 4 * BLOCK_SIZE;
const RECORDS_PER_PAGE: usize = 8;

fn file_header() -> Vec<u8> {
    let mut b = Vec::new();
    b.extend_from_slice(&0xAABBCCDDu64.to_le_bytes());
    b.extend_from_slice(&(SEGMENT_SIZE as u32).to_le_bytes());
    b.extend_from_slice(&(BLOCK_SIZE as u32).to_le_bytes());
    b.extend_from_slice(&(SEGMENT_SIZE as u32).to_le_bytes());
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

fn heap_record(xid: u32) -> Vec<u8> {
    let data = [0u8; 32];
    let total_len = (24 + 2 + data.len()) as u32;
    let mut b = Vec::new();
    b.extend_from_slice(&total_len.to_le_bytes());
    b.extend_from_slice(&xid.to_le_bytes());
    b.extend_from_slice(&0u64.to_le_bytes());
    b.push(0x00);
    b.push(10); // RM_HEAP_ID
    b.extend_from_slice(&0u16.to_le_bytes());
    b.extend_from_slice(&0u32.to_le_bytes());
    b.push(0xFF);
    b.push(data.len() as u8);
    b.extend_from_slice(&data);
    b
}

fn synthetic_segment() -> Vec<u8> {
    let mut data = file_header();
    data.resize(BLOCK_SIZE, 0); // leading file-header region, not a page
    let mut xid = 1u32;
    while data.len() < SEGMENT_SIZE {
        let page_start = (data.len() / BLOCK_SIZE) * BLOCK_SIZE;
        let page_end = page_start + BLOCK_SIZE;
        if data.len() == page_start {
            data.extend_from_slice(&short_header(page_start as u64));
        }
        for _ in 0..RECORDS_PER_PAGE {
            let record = heap_record(xid);
            if data.len() + record.len() > page_end {
                break;
            }
            data.extend_from_slice(&record);
            xid += 1;
        }
        if data.len() < page_end {
            data.resize(page_end, 0);
        }
    }
    data.resize(SEGMENT_SIZE, 0);
    data
}

fn decode_all(data: Vec<u8>) -> usize {
    let decoder = SegmentDecoder::from_bytes(data, Lsn(0)).unwrap();
    decoder.records(None, None).filter(|r| r.is_ok()).count()
}

fn bench_segment_decode(c: &mut Criterion) {
    let data = synthetic_segment();
    c.bench_function("decode_multi_page_segment", |b| {
        b.iter(|| decode_all(black_box(data.clone())))
    });
}

criterion_group!(benches, bench_segment_decode);
criterion_main!(benches);
