//! Block lifecycle tests against the file-backed entry log, the RocksDB state
//! store and the on-disk sequence ledger.

use dseq_core::{
    open_state_store, FinalizeBlockRequest, InfoRequest, PreserveOrder, SequenceLedger, Sequencer,
    SequencerBuilder, SequencerError, SEQUENCE_FILE,
};
use dseq_primitives::{Address, Transaction};
use dseq_stream::{
    marker_height, AtomicStreamWriter, EntryType, FileStream, MemoryStream, StreamReader,
    StreamType,
};
use proptest::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const STREAM_FILE: &str = "dseq.bin";

fn sequencer_address() -> Address {
    Address::from_bytes([0xab; 20])
}

fn file_sequencer(home: &Path) -> Sequencer<FileStream> {
    SequencerBuilder::new()
        .identity("node0")
        .address(sequencer_address())
        .state_store(open_state_store(home.join("state")).unwrap())
        .stream(FileStream::open(home.join(STREAM_FILE), StreamType::SEQUENCER).unwrap())
        .ledger(SequenceLedger::open(home).unwrap())
        .ordering(PreserveOrder)
        .build()
        .unwrap()
}

fn memory_sequencer(home: &Path) -> Sequencer<MemoryStream> {
    SequencerBuilder::new()
        .identity("node0")
        .address(sequencer_address())
        .state_store(open_state_store(home.join("state")).unwrap())
        .stream(MemoryStream::new())
        .build()
        .unwrap()
}

fn block(height: u64, txs: &[&[u8]]) -> FinalizeBlockRequest {
    FinalizeBlockRequest {
        height,
        txs: txs.iter().map(|t| Transaction::copy_from_slice(t)).collect(),
        proposer: sequencer_address(),
        ..Default::default()
    }
}

fn stream_path(home: &Path) -> PathBuf {
    home.join(STREAM_FILE)
}

// ==================== Scenarios ====================

#[test]
fn test_two_transaction_block() {
    let home = TempDir::new().unwrap();
    let mut seq = file_sequencer(home.path());

    seq.finalize_block(block(5, &[b"tx_a", b"tx_b"])).unwrap();
    seq.commit().unwrap();

    let state = seq.state();
    assert_eq!(state.size, 2);
    assert_eq!(state.height, 5);

    let entries: Vec<_> = StreamReader::open(stream_path(home.path()))
        .unwrap()
        .map(|e| e.unwrap())
        .collect();
    let kinds: Vec<_> = entries.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![EntryType::BlockStart, EntryType::Tx, EntryType::Tx, EntryType::BlockEnd]
    );
    assert_eq!(marker_height(&entries[0].payload), Some(5));
    assert_eq!(&entries[1].payload[..], b"tx_a");
    assert_eq!(&entries[2].payload[..], b"tx_b");
    assert_eq!(marker_height(&entries[3].payload), Some(5));

    let ledger = std::fs::read_to_string(home.path().join(SEQUENCE_FILE)).unwrap();
    let lines: Vec<_> = ledger.lines().collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(format!("{}\n", lines[0]), SequenceLedger::line_for(b"tx_a"));
    assert_eq!(format!("{}\n", lines[1]), SequenceLedger::line_for(b"tx_b"));
}

#[test]
fn test_empty_block_leaves_log_untouched() {
    let home = TempDir::new().unwrap();
    let mut seq = file_sequencer(home.path());
    seq.finalize_block(block(1, &[b"first"])).unwrap();
    seq.commit().unwrap();

    let before = std::fs::read(stream_path(home.path())).unwrap();
    let fingerprint = seq.fingerprint();

    let resp = seq.finalize_block(block(2, &[])).unwrap();
    assert_eq!(resp.app_hash, fingerprint);
    seq.commit().unwrap();

    assert_eq!(std::fs::read(stream_path(home.path())).unwrap(), before);
    assert_eq!(seq.fingerprint(), fingerprint);
    assert_eq!(seq.state().height, 2);
}

// ==================== Atomicity ====================

#[test]
fn test_failed_block_leaves_no_entries() {
    let home = TempDir::new().unwrap();
    let mut seq = memory_sequencer(home.path());
    seq.finalize_block(block(1, &[b"a"])).unwrap();
    seq.commit().unwrap();
    let committed = seq.stream().entries().len();

    // BlockStart plus two of three transactions go in, the third fails
    seq.stream_mut().fail_append_after(3);
    let err = seq.finalize_block(block(2, &[b"b", b"c", b"d"])).unwrap_err();
    assert!(matches!(err, SequencerError::LogWrite(_)));
    assert_eq!(seq.stream().entries().len(), committed);
    assert_eq!(seq.state().height, 1);

    seq.finalize_block(block(2, &[b"b", b"c", b"d"])).unwrap();
    seq.commit().unwrap();

    let numbers: Vec<u64> = seq.stream().entries().iter().map(|e| e.number).collect();
    let expected: Vec<u64> = (0..numbers.len() as u64).collect();
    assert_eq!(numbers, expected);
    assert_eq!(seq.stream().entries().len(), committed + 5);
    assert_eq!(seq.state().size, 4);
}

#[test]
fn test_rollback_failure_is_unrecoverable() {
    let home = TempDir::new().unwrap();
    let mut seq = memory_sequencer(home.path());
    seq.stream_mut().fail_append_after(1);
    seq.stream_mut().fail_next_rollback();

    let err = seq.finalize_block(block(1, &[b"a"])).unwrap_err();
    assert!(err.is_unrecoverable());
    match err {
        SequencerError::RollbackFailed { cause, rollback } => {
            assert!(cause.to_string().contains("append"));
            assert!(rollback.to_string().contains("rollback"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(seq.is_halted());
}

// ==================== Restart ====================

#[test]
fn test_restart_resumes_committed_state() {
    let home = TempDir::new().unwrap();
    {
        let mut seq = file_sequencer(home.path());
        seq.finalize_block(block(1, &[b"a", b"b"])).unwrap();
        seq.commit().unwrap();
        seq.finalize_block(block(2, &[b"c"])).unwrap();
        seq.commit().unwrap();
        seq.close().unwrap();
    }

    let mut seq = file_sequencer(home.path());
    let info = seq.info(&InfoRequest::default());
    assert_eq!(info.last_block_height, 2);
    assert_eq!(info.last_block_app_hash, 3u64.to_be_bytes());
    assert_eq!(seq.stream().last_block_height(), Some(2));

    seq.finalize_block(block(3, &[b"d"])).unwrap();
    seq.commit().unwrap();
    assert_eq!(seq.state().size, 4);

    let reader = StreamReader::open(stream_path(home.path())).unwrap();
    assert_eq!(reader.entry_count(), 10);
    let ledger = std::fs::read_to_string(home.path().join(SEQUENCE_FILE)).unwrap();
    assert_eq!(ledger.lines().count(), 4);
}

#[test]
fn test_replayed_height_is_not_logged_twice() {
    let home = TempDir::new().unwrap();
    {
        // Crash between FinalizeBlock and Commit
        let mut seq = file_sequencer(home.path());
        seq.finalize_block(block(1, &[b"a"])).unwrap();
    }

    let mut seq = file_sequencer(home.path());
    assert_eq!(seq.state().height, 0);
    assert_eq!(seq.stream().last_block_height(), Some(1));

    let resp = seq.finalize_block(block(1, &[b"a"])).unwrap();
    assert_eq!(resp.app_hash, 1u64.to_be_bytes());
    seq.commit().unwrap();

    assert_eq!(seq.state().size, 1);
    assert_eq!(seq.stream().entry_count(), 3);
}

#[test]
fn test_other_block_at_replayed_height_is_refused() {
    let home = TempDir::new().unwrap();
    {
        let mut seq = file_sequencer(home.path());
        seq.finalize_block(block(1, &[b"a"])).unwrap();
    }

    let mut seq = file_sequencer(home.path());
    let err = seq.finalize_block(block(1, &[b"b", b"c"])).unwrap_err();
    assert!(matches!(err, SequencerError::LogDiverged { height: 1, logged: 1 }));
    assert!(err.is_unrecoverable());
    assert!(matches!(seq.commit(), Err(SequencerError::Halted)));

    let tx_entries = StreamReader::open(stream_path(home.path()))
        .unwrap()
        .map(|e| e.unwrap())
        .filter(|e| e.kind == EntryType::Tx)
        .count();
    assert_eq!(tx_entries, 1);
    assert_eq!(seq.state().size, 0);
    let ledger = std::fs::read_to_string(home.path().join(SEQUENCE_FILE)).unwrap();
    assert_eq!(ledger.lines().count(), 0);
}

// ==================== Properties ====================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_size_tracks_committed_transactions(
        blocks in proptest::collection::vec(0usize..6, 1..12)
    ) {
        let home = TempDir::new().unwrap();
        let mut seq = memory_sequencer(home.path());
        let mut expected = 0u64;
        let mut previous = 0u64;

        for (i, count) in blocks.into_iter().enumerate() {
            let height = i as u64 + 1;
            let txs: Vec<Transaction> = (0..count)
                .map(|n| Transaction::from(format!("{height}-{n}").into_bytes()))
                .collect();
            seq.finalize_block(FinalizeBlockRequest { height, txs, ..Default::default() }).unwrap();
            seq.commit().unwrap();

            expected += count as u64;
            let state = seq.state();
            prop_assert!(state.size >= previous);
            prop_assert_eq!(state.size, expected);
            prop_assert_eq!(state.height, height);
            prop_assert_eq!(seq.fingerprint(), expected.to_be_bytes());
            previous = state.size;
        }
    }
}
