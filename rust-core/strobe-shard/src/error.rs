// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// Strobe shard - Error types

use strobe_wal::WalError;
use strobe_wire::ProtocolError;
use thiserror::Error;

use crate::health::ShardHealth;

/// Errors raised by shard operations.
#[derive(Debug, Error)]
pub enum ShardError {
    /// A malformed request; nothing changed.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Too many documents are waiting for a flush.
    #[error("ingest backlog full: {buffered} buffered, limit {limit}")]
    Overloaded {
        /// Documents currently buffered.
        buffered: usize,
        /// Configured cap.
        limit: usize,
    },

    /// The shard is not in a state that accepts writes.
    #[error("shard is {0} and does not accept writes")]
    NotWritable(ShardHealth),

    /// The shard is not in a state that serves reads.
    #[error("shard is {0} and does not serve reads")]
    NotReadable(ShardHealth),

    /// The document belongs to another shard.
    #[error("document {doc_id} belongs to shard {owner}, this is shard {shard_id}")]
    WrongShard {
        /// Rejected document.
        doc_id: u64,
        /// Shard that owns it.
        owner: u32,
        /// This shard.
        shard_id: u32,
    },

    /// Documents are immutable once ingested.
    #[error("document {0} already exists")]
    DuplicateDocument(u64),

    /// WAL append, sync or checkpoint failed. The shard is now degraded.
    #[error("durability failure: {0}")]
    Durability(#[from] WalError),

    /// Boot replay could not read the log.
    #[error("WAL recovery failed: {0}")]
    Recovery(#[source] WalError),

    /// The configuration cannot be used.
    #[error("invalid shard configuration: {0}")]
    Config(String),

    /// Directory setup failed.
    #[error("shard I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ShardError {
    /// Whether the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ShardError::Overloaded { .. })
    }
}

/// Convenience type alias for shard results.
pub type ShardResult<T> = Result<T, ShardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrong_shard_message() {
        let err = ShardError::WrongShard {
            doc_id: 7,
            owner: 1,
            shard_id: 0,
        };
        assert_eq!(err.to_string(), "document 7 belongs to shard 1, this is shard 0");
    }

    #[test]
    fn test_only_overload_is_retryable() {
        assert!(ShardError::Overloaded {
            buffered: 1,
            limit: 1
        }
        .is_retryable());
        assert!(!ShardError::DuplicateDocument(1).is_retryable());
        assert!(!ShardError::Durability(WalError::Poisoned).is_retryable());
    }
}
