// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//! Property-based tests for WAL replay and recovery

use std::fs::OpenOptions;

use proptest::prelude::*;
use strobe_signature::{Signature, SIGNATURE_WORDS};
use strobe_wal::{
    segment::list_segments, RecordBody, SyncPolicy, WalReader, WalWriter, DOCUMENT_RECORD_SIZE,
};
use tempfile::TempDir;

fn arb_signature() -> impl Strategy<Value = Signature> {
    prop::collection::vec(any::<u64>(), SIGNATURE_WORDS)
        .prop_map(|words| Signature::try_from_words(&words).unwrap())
}

fn arb_documents() -> impl Strategy<Value = Vec<(u64, Signature)>> {
    prop::collection::vec((any::<u64>(), arb_signature()), 1..24)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_recover_returns_what_was_written(docs in arb_documents()) {
        let dir = TempDir::new().unwrap();
        {
            let mut writer = WalWriter::open(dir.path(), SyncPolicy::Never).unwrap();
            for (doc_id, signature) in &docs {
                writer.append_document(*doc_id, signature.clone()).unwrap();
            }
            writer.sync().unwrap();
        }

        let recovery = WalReader::open(dir.path()).unwrap().recover().unwrap();
        prop_assert!(!recovery.repaired());
        let recovered: Vec<(u64, Signature)> = recovery
            .documents()
            .map(|(id, sig)| (id, sig.clone()))
            .collect();
        prop_assert_eq!(recovered, docs);
    }

    #[test]
    fn test_any_cut_recovers_a_prefix(docs in arb_documents(), cut_fraction in 0.0f64..1.0) {
        let dir = TempDir::new().unwrap();
        {
            let mut writer = WalWriter::open(dir.path(), SyncPolicy::Never).unwrap();
            for (doc_id, signature) in &docs {
                writer.append_document(*doc_id, signature.clone()).unwrap();
            }
            writer.sync().unwrap();
        }

        let segment = list_segments(dir.path()).unwrap().remove(0);
        let cut = (segment.file_size as f64 * cut_fraction) as u64;
        OpenOptions::new()
            .write(true)
            .open(&segment.path)
            .unwrap()
            .set_len(cut)
            .unwrap();

        let recovery = WalReader::open(dir.path()).unwrap().recover().unwrap();
        let whole = (cut as usize) / DOCUMENT_RECORD_SIZE;
        prop_assert_eq!(recovery.records.len(), whole);
        for (record, (doc_id, signature)) in recovery.records.iter().zip(&docs) {
            prop_assert_eq!(
                &record.body,
                &RecordBody::Document { doc_id: *doc_id, signature: signature.clone() }
            );
        }
        prop_assert_eq!(recovery.truncation.is_some(), cut as usize % DOCUMENT_RECORD_SIZE != 0);
    }
}
