// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// Strobe Write-Ahead Log (WAL) crate
//
// Makes ingested documents durable before they become searchable. Every
// document is appended to an append-only log; on restart the log is
// replayed to rebuild the shard's in-memory index.
//
// # Architecture
//
// The WAL is a sequence of **segment files** in a per-shard directory. Each
// segment is an append-only binary file of length-prefixed, CRC32-protected
// records. Segments rotate when they exceed a configurable maximum size
// (default 64 MiB).
//
// Sync work is split from the append: `WalWriter::append` writes the bytes
// and, when the `SyncPolicy` says so, returns a `PendingSync` that the
// caller completes after releasing its own locks.
//
// ## On-disk record format (all integers little-endian)
//
// ```text
// [4 bytes: record_length (u32)]  -- length of everything after this field
// [4 bytes: crc32 checksum]       -- CRC32 of all bytes after this field
// [8 bytes: sequence (u64)]
// [8 bytes: timestamp (i64)]      -- Unix milliseconds UTC
// [1 byte:  kind]                 -- 0=Document, 1=Checkpoint
// [8 bytes: subject (u64)]        -- doc_id, or covered sequence
// [2 bytes: word_count (u16)]     -- 64 for documents, 0 for checkpoints
// [word_count * 8 bytes: signature words]
// ```
//
// ## Usage
//
// ```no_run
// use strobe_signature::SignatureBuilder;
// use strobe_wal::{SyncPolicy, WalReader, WalWriter};
//
// let dir = "/tmp/strobe-wal";
// let mut writer = WalWriter::open(dir, "coalesce:1048576".parse().unwrap()).unwrap();
//
// let signature = SignatureBuilder::default().build("hello world");
// let appended = writer.append_document(42, signature).unwrap();
// if let Some(pending) = appended.pending_sync {
//     pending.complete().unwrap();
// }
// writer.checkpoint().unwrap();
//
// let recovery = WalReader::open(dir).unwrap().recover().unwrap();
// for (doc_id, _signature) in recovery.documents() {
//     println!("recovered doc {doc_id}");
// }
// ```

pub mod error;
pub mod reader;
pub mod record;
pub mod segment;
pub mod writer;

// Re-export the primary public API for ergonomic imports.
pub use error::{WalError, WalResult};
pub use reader::{Recovery, Truncation, WalReader};
pub use record::{RecordBody, RecordKind, WalRecord, DOCUMENT_RECORD_SIZE};
pub use segment::{SegmentInfo, DEFAULT_MAX_SEGMENT_SIZE};
pub use writer::{
    Appended, DurablePosition, PendingSync, SyncPolicy, WalWriter, DEFAULT_COALESCE_BYTES,
    FIRST_SEQUENCE,
};
