// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// Strobe Write-Ahead Log - Error types
//
// Defines all error conditions that can arise during WAL operations:
// I/O failures, record corruption found during recovery, and invalid
// configuration of the sync policy.

use thiserror::Error;

/// Errors that can occur during WAL operations.
#[derive(Debug, Error)]
pub enum WalError {
    /// An I/O error occurred while reading, writing or syncing a segment.
    #[error("WAL I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CRC32 checksum mismatch detected during record validation.
    /// This indicates data corruption, either from disk failure or
    /// an incomplete write (crash mid-flush).
    #[error("CRC mismatch at sequence {sequence}: expected {expected:#010x}, got {actual:#010x}")]
    CrcMismatch {
        /// The sequence number read from the (untrusted) record body.
        sequence: u64,
        /// The CRC32 value stored in the record header.
        expected: u32,
        /// The CRC32 value computed from the record body.
        actual: u32,
    },

    /// The record header declares a length outside the accepted bounds.
    #[error("Record declares length {length} bytes, outside the accepted bound {max_length}")]
    RecordTooLarge {
        /// The declared length in the record header.
        length: u32,
        /// The maximum allowed record length.
        max_length: u32,
    },

    /// An unknown record kind byte was encountered.
    #[error("Invalid record kind byte: {0}")]
    InvalidRecordKind(u8),

    /// A document record carries a signature of the wrong width.
    #[error("Record signature has {actual} words, deployment width is {expected}")]
    WidthMismatch {
        /// Words per signature in this deployment.
        expected: usize,
        /// Words recorded in the record.
        actual: usize,
    },

    /// Sequence numbers must be gap-free; a record broke the chain.
    #[error("Sequence gap: expected {expected}, found {found}")]
    SequenceGap {
        /// The sequence that should have come next.
        expected: u64,
        /// The sequence actually found.
        found: u64,
    },

    /// The segment ends in the middle of a record.
    /// This typically happens when a crash occurs mid-write.
    #[error("Truncated record at offset {offset} in segment {segment}")]
    TruncatedRecord {
        /// The byte offset where the truncation was detected.
        offset: u64,
        /// The segment file name.
        segment: String,
    },

    /// Attempted to read past the end of a record body.
    #[error("Unexpected end of record at offset {0}")]
    UnexpectedEof(u64),

    /// The WAL directory does not exist or is not accessible.
    #[error("WAL directory not found or inaccessible: {0}")]
    DirectoryNotFound(String),

    /// The sync policy string could not be parsed.
    #[error("Invalid WAL sync policy '{0}' (expected always, never or coalesce:<bytes>)")]
    InvalidSyncPolicy(String),

    /// A previous write failed part-way; the writer refuses further appends
    /// because the segment tail may hold a torn record.
    #[error("WAL writer is poisoned by an earlier write failure")]
    Poisoned,
}

impl WalError {
    /// Whether this error describes on-disk corruption (as opposed to an
    /// I/O failure or misuse).
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            WalError::CrcMismatch { .. }
                | WalError::RecordTooLarge { .. }
                | WalError::InvalidRecordKind(_)
                | WalError::WidthMismatch { .. }
                | WalError::SequenceGap { .. }
                | WalError::TruncatedRecord { .. }
                | WalError::UnexpectedEof(_)
        )
    }
}

/// Convenience type alias for WAL results.
pub type WalResult<T> = Result<T, WalError>;
