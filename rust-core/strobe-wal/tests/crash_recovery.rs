// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//! Crash simulation against the coalescing sync policy
//!
//! A process crash loses whatever sat in the page cache after the last
//! fsync. The test cuts the segment back to the writer's durable mark and
//! leaves a torn record behind it, which is what the disk holds after a
//! power cut in the middle of a coalescing window.

use std::fs::OpenOptions;
use std::io::Write;

use strobe_signature::SignatureBuilder;
use strobe_wal::{
    segment::list_segments, SyncPolicy, WalReader, WalRecord, WalWriter, DEFAULT_COALESCE_BYTES,
    DOCUMENT_RECORD_SIZE,
};
use tempfile::TempDir;

#[test]
fn test_coalesced_crash_keeps_every_durable_record() {
    let dir = TempDir::new().unwrap();
    let builder = SignatureBuilder::default();
    let record_size = DOCUMENT_RECORD_SIZE as u64;

    let durable = {
        let mut writer = WalWriter::open(
            dir.path(),
            SyncPolicy::Coalesce {
                bytes: DEFAULT_COALESCE_BYTES,
            },
        )
        .unwrap();

        // Fill the first coalescing window.
        let mut doc_id = 0u64;
        let first_sync = loop {
            doc_id += 1;
            let appended = writer
                .append_document(doc_id, builder.build(&format!("tok{doc_id}")))
                .unwrap();
            if let Some(pending) = appended.pending_sync {
                break pending.complete().unwrap();
            }
        };
        assert_eq!(first_sync.sequence, doc_id);
        assert!(first_sync.offset >= DEFAULT_COALESCE_BYTES);

        // Keep writing inside the next window without reaching its threshold.
        while writer.unsynced_bytes() + record_size < DEFAULT_COALESCE_BYTES {
            doc_id += 1;
            let appended = writer
                .append_document(doc_id, builder.build(&format!("tok{doc_id}")))
                .unwrap();
            assert!(appended.pending_sync.is_none());
        }
        assert!(writer.last_sequence() > first_sync.sequence);

        writer.durable()
    };

    // Simulate the crash: drop the unsynced window, then leave half a record.
    let segment = list_segments(dir.path()).unwrap().remove(0);
    assert_eq!(segment.start_sequence, durable.segment_start);
    {
        let mut file = OpenOptions::new().write(true).open(&segment.path).unwrap();
        file.set_len(durable.offset).unwrap();
    }
    {
        let mut file = OpenOptions::new().append(true).open(&segment.path).unwrap();
        let torn = WalRecord::document(u64::MAX, builder.build("torn")).serialize();
        file.write_all(&torn[..torn.len() / 2]).unwrap();
    }

    let recovery = WalReader::open(dir.path()).unwrap().recover().unwrap();
    assert_eq!(recovery.last_sequence(), durable.sequence);
    let sequences: Vec<u64> = recovery.records.iter().map(|r| r.sequence).collect();
    let expected: Vec<u64> = (1..=durable.sequence).collect();
    assert_eq!(sequences, expected);
    assert_eq!(recovery.truncation.unwrap().offset, durable.offset);

    // The log accepts new writes right after the durable prefix.
    let mut writer = WalWriter::open(dir.path(), SyncPolicy::Always).unwrap();
    assert_eq!(writer.next_sequence(), durable.sequence + 1);
    writer
        .append_document(1, builder.build("after"))
        .unwrap()
        .sync_now()
        .unwrap();
}

#[test]
fn test_always_policy_loses_nothing_acknowledged() {
    let dir = TempDir::new().unwrap();
    let builder = SignatureBuilder::default();
    {
        let mut writer = WalWriter::open(dir.path(), SyncPolicy::Always).unwrap();
        for doc_id in 1..=50 {
            writer
                .append_document(doc_id, builder.build(&format!("doc {doc_id}")))
                .unwrap()
                .sync_now()
                .unwrap();
        }
        assert_eq!(writer.durable().sequence, 50);
    }

    let recovery = WalReader::open(dir.path()).unwrap().recover().unwrap();
    assert_eq!(recovery.records.len(), 50);
    assert!(recovery.truncation.is_none());
}
