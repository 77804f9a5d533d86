//! Transaction state machine: consumes a `postgres_ffi::Record` stream
//! and maintains per-xid state (active / committed / aborted /
//! prepared), linking subtransactions to their parents.

use std::collections::{HashMap, HashSet};

use postgres_ffi::pg_constants::{
    XLOG_XACT_ABORT, XLOG_XACT_ABORT_PREPARED, XLOG_XACT_ASSIGNMENT, XLOG_XACT_COMMIT,
    XLOG_XACT_COMMIT_PREPARED, XLOG_XACT_INVALID, XLOG_XACT_OPMASK, XLOG_XACT_PREPARE,
};
use postgres_ffi::{Lsn, Record, RmgrId};

use crate::diagnostic::TrackerDiagnostic;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    InProgress,
    Prepared,
    Committed,
    Aborted,
}

#[derive(Debug, Clone)]
pub struct TransactionInfo {
    pub xid: u32,
    pub state: TransactionState,
    pub start_lsn: Option<Lsn>,
    pub commit_lsn: Option<Lsn>,
    pub subxids: HashSet<u32>,
    pub parent_xid: Option<u32>,
    pub records: Vec<Record>,
}

impl TransactionInfo {
    fn new(xid: u32, start_lsn: Option<Lsn>) -> Self {
        TransactionInfo {
            xid,
            state: TransactionState::InProgress,
            start_lsn,
            commit_lsn: None,
            subxids: HashSet::new(),
            parent_xid: None,
            records: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TrackerStats {
    pub total_seen: u64,
    pub committed_count: u64,
    pub aborted_count: u64,
    pub active_count: u64,
}

/// Owns the entire tracked transaction set. Nothing outside this type
/// mutates `active`/`committed`/`aborted` directly.
#[derive(Default)]
pub struct TransactionTracker {
    active: HashMap<u32, TransactionInfo>,
    committed: HashMap<u32, TransactionInfo>,
    aborted: HashMap<u32, TransactionInfo>,
    subxid_parent: HashMap<u32, u32>,
    total_seen: u64,
    committed_count: u64,
    aborted_count: u64,
}

impl TransactionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears all tracked state, so a single tracker can be reused
    /// across segments by a caller that wants one running view.
    pub fn reset(&mut self) {
        self.active.clear();
        self.committed.clear();
        self.aborted.clear();
        self.subxid_parent.clear();
        self.total_seen = 0;
        self.committed_count = 0;
        self.aborted_count = 0;
    }

    pub fn get(&self, xid: u32) -> Option<&TransactionInfo> {
        self.active
            .get(&xid)
            .or_else(|| self.committed.get(&xid))
            .or_else(|| self.aborted.get(&xid))
    }

    pub fn is_active(&self, xid: u32) -> bool {
        self.active.contains_key(&xid)
    }

    pub fn is_committed(&self, xid: u32) -> bool {
        self.committed.contains_key(&xid)
    }

    pub fn is_aborted(&self, xid: u32) -> bool {
        self.aborted.contains_key(&xid)
    }

    pub fn records_of(&self, xid: u32) -> &[Record] {
        self.get(xid).map(|t| t.records.as_slice()).unwrap_or(&[])
    }

    /// All committed transactions' records, concatenated. Order is
    /// stable per xid but inter-xid order follows the order in which
    /// each transaction reached its terminal commit.
    pub fn all_committed_records(&self) -> Vec<&Record> {
        self.committed.values().flat_map(|t| t.records.iter()).collect()
    }

    pub fn stats(&self) -> TrackerStats {
        TrackerStats {
            total_seen: self.total_seen,
            committed_count: self.committed_count,
            aborted_count: self.aborted_count,
            active_count: self.active.len() as u64,
        }
    }

    /// Links `sub` to `parent`, creating `sub`'s active entry if it
    /// doesn't exist yet. Returns an `OrphanSubxid` diagnostic if
    /// `parent` has no active entry of its own (the link is still
    /// recorded — a later record or terminal transition for `parent`
    /// will pick it up).
    pub fn add_subtransaction(&mut self, parent: u32, sub: u32) -> Option<TrackerDiagnostic> {
        self.subxid_parent.insert(sub, parent);
        let parent_known = if let Some(parent_txn) = self.active.get_mut(&parent) {
            parent_txn.subxids.insert(sub);
            true
        } else {
            false
        };
        self.active.entry(sub).or_insert_with(|| {
            let mut info = TransactionInfo::new(sub, None);
            info.parent_xid = Some(parent);
            info
        });
        if parent_known {
            None
        } else {
            Some(TrackerDiagnostic::OrphanSubxid {
                parent_xid: parent,
                subxid: sub,
            })
        }
    }

    /// Convenience wrapper for feeding a decoder's `WalResult<Record>`
    /// directly: a decode error becomes a `DecodeError` diagnostic
    /// instead of a panic or a propagated `Err`.
    pub fn process_decoded(
        &mut self,
        decoded: postgres_ffi::WalResult<Record>,
    ) -> Option<TrackerDiagnostic> {
        match decoded {
            Ok(record) => self.process(record),
            Err(e) => Some(TrackerDiagnostic::DecodeError(e)),
        }
    }

    /// Feeds one record through the state machine. Returns a
    /// diagnostic when the record hit a non-fatal, notable condition;
    /// the tracker's state is always left consistent regardless.
    pub fn process(&mut self, record: Record) -> Option<TrackerDiagnostic> {
        self.total_seen += 1;
        let xid = record.xid();

        if RmgrId::from(record.rmid()).is_transaction() {
            return self.process_transaction_record(record);
        }

        if xid != 0 {
            if self.is_committed(xid) || self.is_aborted(xid) {
                let diag = TrackerDiagnostic::LateRecord { xid };
                tracing::warn!(xid, "record against terminal transaction, dropping");
                return Some(diag);
            }
            let prev_lsn = record.prev_lsn();
            let txn = self
                .active
                .entry(xid)
                .or_insert_with(|| TransactionInfo::new(xid, Some(prev_lsn)));
            txn.records.push(record);
        }
        None
    }

    fn process_transaction_record(&mut self, record: Record) -> Option<TrackerDiagnostic> {
        let xid = record.xid();
        let opcode = record.header.info & XLOG_XACT_OPMASK;

        match opcode {
            XLOG_XACT_COMMIT => self.finish(xid, &record, TransactionState::Committed),
            XLOG_XACT_ABORT => self.finish(xid, &record, TransactionState::Aborted),
            XLOG_XACT_PREPARE => {
                if self.is_committed(xid) || self.is_aborted(xid) {
                    return Some(TrackerDiagnostic::LateRecord { xid });
                }
                let prev_lsn = record.prev_lsn();
                let txn = self
                    .active
                    .entry(xid)
                    .or_insert_with(|| TransactionInfo::new(xid, Some(prev_lsn)));
                txn.state = TransactionState::Prepared;
                tracing::trace!(xid, "transaction prepared");
                None
            }
            XLOG_XACT_COMMIT_PREPARED => self.finish(xid, &record, TransactionState::Committed),
            XLOG_XACT_ABORT_PREPARED => self.finish(xid, &record, TransactionState::Aborted),
            XLOG_XACT_ASSIGNMENT => {
                let subxids = parse_assignment_subxids(record.main_data().unwrap_or(&[]));
                let mut diag = None;
                for sub in subxids {
                    diag = diag.or(self.add_subtransaction(xid, sub));
                }
                diag
            }
            XLOG_XACT_INVALID => {
                tracing::warn!(xid, "XLOG_XACT_INVALID opcode observed");
                Some(TrackerDiagnostic::InvalidOpcode { xid })
            }
            _ => {
                if self.is_committed(xid) || self.is_aborted(xid) {
                    return Some(TrackerDiagnostic::LateRecord { xid });
                }
                let prev_lsn = record.prev_lsn();
                let txn = self
                    .active
                    .entry(xid)
                    .or_insert_with(|| TransactionInfo::new(xid, Some(prev_lsn)));
                txn.records.push(record);
                None
            }
        }
    }

    fn finish(
        &mut self,
        xid: u32,
        record: &Record,
        state: TransactionState,
    ) -> Option<TrackerDiagnostic> {
        if self.is_committed(xid) || self.is_aborted(xid) {
            tracing::warn!(xid, "terminal transaction revisited");
            return Some(TrackerDiagnostic::LateRecord { xid });
        }

        let commit_lsn = record.prev_lsn();
        let mut txn = self
            .active
            .remove(&xid)
            .unwrap_or_else(|| TransactionInfo::new(xid, None));
        txn.state = state;
        txn.commit_lsn = Some(commit_lsn);

        let subxids: Vec<u32> = txn.subxids.iter().copied().collect();
        for sub in &subxids {
            self.propagate_to_subxid(*sub, state, commit_lsn);
        }

        tracing::trace!(xid, ?state, "transaction reached terminal state");
        match state {
            TransactionState::Committed => {
                self.committed_count += 1;
                self.committed.insert(xid, txn);
            }
            TransactionState::Aborted => {
                self.aborted_count += 1;
                self.aborted.insert(xid, txn);
            }
            _ => unreachable!("finish is only called with a terminal state"),
        }
        None
    }

    fn propagate_to_subxid(&mut self, sub: u32, state: TransactionState, commit_lsn: Lsn) {
        let Some(mut sub_txn) = self.active.remove(&sub) else {
            return;
        };
        sub_txn.state = state;
        sub_txn.commit_lsn = Some(commit_lsn);
        match state {
            TransactionState::Committed => {
                self.committed_count += 1;
                self.committed.insert(sub, sub_txn);
            }
            TransactionState::Aborted => {
                self.aborted_count += 1;
                self.aborted.insert(sub, sub_txn);
            }
            _ => unreachable!("propagate_to_subxid is only called with a terminal state"),
        }
    }
}

/// Parses the `{xtop: u32, nsubxacts: i32, subxacts: [u32; nsubxacts]}`
/// payload of an `XLOG_XACT_ASSIGNMENT` record's main data. Tolerant of
/// a short buffer: returns whatever prefix parses cleanly.
fn parse_assignment_subxids(main_data: &[u8]) -> Vec<u32> {
    use postgres_ffi::ByteCursor;

    let mut cursor = ByteCursor::new(main_data);
    if cursor.read_u32().is_err() {
        return Vec::new();
    }
    let nsubxacts = match cursor.read_i32() {
        Ok(n) if n >= 0 => n as usize,
        _ => return Vec::new(),
    };
    let mut subxids = Vec::with_capacity(nsubxacts.min(1024));
    for _ in 0..nsubxacts {
        match cursor.read_u32() {
            Ok(sub) => subxids.push(sub),
            Err(_) => break,
        }
    }
    subxids
}

#[cfg(test)]
mod tests {
    use super::*;
    use postgres_ffi::{BodyEntry, RecordHeader};

    fn xact_record(xid: u32, info: u8, prev_lsn: u64, main_data: Option<Vec<u8>>) -> Record {
        let mut entries = Vec::new();
        if let Some(data) = main_data {
            entries.push(BodyEntry::ShortMainData(data));
        }
        Record {
            header: RecordHeader {
                total_len: 24,
                xid,
                prev_lsn: Lsn(prev_lsn),
                info,
                rmid: 1, // Transaction
                crc: 0,
            },
            start_offset: 0,
            lsn: Lsn(prev_lsn),
            entries,
        }
    }

    fn heap_record(xid: u32, prev_lsn: u64) -> Record {
        Record {
            header: RecordHeader {
                total_len: 24,
                xid,
                prev_lsn: Lsn(prev_lsn),
                info: 0,
                rmid: 10, // Heap
                crc: 0,
            },
            start_offset: 0,
            lsn: Lsn(prev_lsn),
            entries: Vec::new(),
        }
    }

    #[test]
    fn single_commit_updates_stats_and_commit_lsn() {
        let mut tracker = TransactionTracker::new();
        tracker.process(heap_record(42, 10));
        let diag = tracker.process(xact_record(42, XLOG_XACT_COMMIT, 99, None));

        assert!(diag.is_none());
        let stats = tracker.stats();
        assert_eq!(stats.committed_count, 1);
        assert_eq!(stats.active_count, 0);
        let txn = tracker.get(42).unwrap();
        assert_eq!(txn.state, TransactionState::Committed);
        assert_eq!(txn.commit_lsn, Some(Lsn(99)));
    }

    #[test]
    fn interleaved_dml_abort_leaves_other_xid_active() {
        let mut tracker = TransactionTracker::new();
        tracker.process(heap_record(100, 1));
        tracker.process(heap_record(101, 2));
        tracker.process(xact_record(100, XLOG_XACT_ABORT, 50, None));

        assert!(tracker.is_aborted(100));
        assert!(tracker.is_active(101));
        assert!(!tracker.is_active(100));
    }

    #[test]
    fn subtransaction_commit_propagates_to_both_xids() {
        let mut tracker = TransactionTracker::new();
        tracker.process(heap_record(3, 1));
        let assignment_body = {
            let mut b = Vec::new();
            b.extend_from_slice(&3u32.to_le_bytes()); // xtop
            b.extend_from_slice(&1i32.to_le_bytes()); // nsubxacts
            b.extend_from_slice(&7u32.to_le_bytes()); // subxid 7
            b
        };
        tracker.process(xact_record(3, XLOG_XACT_ASSIGNMENT, 0, Some(assignment_body)));
        assert!(tracker.is_active(7));

        tracker.process(xact_record(3, XLOG_XACT_COMMIT, 200, None));

        assert!(tracker.is_committed(3));
        assert!(tracker.is_committed(7));
        assert_eq!(tracker.get(3).unwrap().commit_lsn, Some(Lsn(200)));
        assert_eq!(tracker.get(7).unwrap().commit_lsn, Some(Lsn(200)));
    }

    #[test]
    fn late_record_against_terminal_xid_is_diagnosed_not_applied() {
        let mut tracker = TransactionTracker::new();
        tracker.process(xact_record(5, XLOG_XACT_COMMIT, 10, None));
        let stats_before = tracker.stats();

        let diag = tracker.process(heap_record(5, 20));
        assert!(matches!(diag, Some(TrackerDiagnostic::LateRecord { xid: 5 })));

        let stats_after = tracker.stats();
        assert_eq!(stats_before.committed_count, stats_after.committed_count);
        assert_eq!(tracker.records_of(5).len(), 0);
    }

    #[test]
    fn invalid_opcode_is_surfaced_as_diagnostic() {
        let mut tracker = TransactionTracker::new();
        let diag = tracker.process(xact_record(1, XLOG_XACT_INVALID, 0, None));
        assert!(matches!(diag, Some(TrackerDiagnostic::InvalidOpcode { xid: 1 })));
    }

    #[test]
    fn reset_clears_all_state() {
        let mut tracker = TransactionTracker::new();
        tracker.process(xact_record(1, XLOG_XACT_COMMIT, 5, None));
        tracker.reset();
        let stats = tracker.stats();
        assert_eq!(stats.total_seen, 0);
        assert_eq!(stats.committed_count, 0);
        assert!(tracker.get(1).is_none());
    }
}
