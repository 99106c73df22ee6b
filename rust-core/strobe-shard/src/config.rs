// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// Strobe shard - Configuration

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strobe_signature::DEFAULT_HASHES_PER_SHINGLE;
use strobe_wal::{SyncPolicy, DEFAULT_MAX_SEGMENT_SIZE};

use crate::error::{ShardError, ShardResult};

/// Static shard identity and tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardConfig {
    /// This shard's index in `0..shard_count`.
    pub shard_id: u32,
    /// Number of shards the document space is split across.
    pub shard_count: u32,
    /// Root data directory; the WAL lives under `shard-<id>/wal`.
    pub data_dir: PathBuf,
    /// When the WAL fsyncs.
    pub sync_policy: SyncPolicy,
    /// Buffered documents that trigger a flush.
    pub flush_docs: usize,
    /// Maximum age of the oldest buffered document before a flush.
    pub flush_interval_ms: u64,
    /// Ingest is refused once this many documents await a flush.
    pub max_buffered_docs: usize,
    /// Documents per segment built during boot replay.
    pub replay_segment_docs: usize,
    /// More segments than this are merged into one after a flush.
    pub max_segments: usize,
    /// WAL segment rotation size in bytes.
    pub max_wal_segment_bytes: u64,
    /// Bit positions set per shingle by the signature builder.
    pub hashes_per_shingle: u32,
}

impl ShardConfig {
    /// Defaults for a single-shard deployment rooted at `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            shard_id: 0,
            shard_count: 1,
            data_dir: data_dir.into(),
            sync_policy: SyncPolicy::default(),
            flush_docs: 4096,
            flush_interval_ms: 5,
            max_buffered_docs: 262_144,
            replay_segment_docs: 200_000,
            max_segments: 64,
            max_wal_segment_bytes: DEFAULT_MAX_SEGMENT_SIZE,
            hashes_per_shingle: DEFAULT_HASHES_PER_SHINGLE,
        }
    }

    /// Directory holding this shard's WAL segments.
    pub fn wal_dir(&self) -> PathBuf {
        self.data_dir
            .join(format!("shard-{}", self.shard_id))
            .join("wal")
    }

    /// Flush interval as a `Duration`.
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Shard that owns `doc_id`.
    pub fn owner_of(&self, doc_id: u64) -> u32 {
        (doc_id % u64::from(self.shard_count)) as u32
    }

    /// Whether this shard owns `doc_id`.
    pub fn owns(&self, doc_id: u64) -> bool {
        self.owner_of(doc_id) == self.shard_id
    }

    /// Reject unusable settings.
    pub fn validate(&self) -> ShardResult<()> {
        if self.shard_count == 0 {
            return Err(ShardError::Config("shard_count must be at least 1".into()));
        }
        if self.shard_id >= self.shard_count {
            return Err(ShardError::Config(format!(
                "shard_id {} out of range for shard_count {}",
                self.shard_id, self.shard_count
            )));
        }
        for (name, value) in [
            ("flush_docs", self.flush_docs),
            ("max_buffered_docs", self.max_buffered_docs),
            ("replay_segment_docs", self.replay_segment_docs),
            ("max_segments", self.max_segments),
        ] {
            if value == 0 {
                return Err(ShardError::Config(format!("{name} must be greater than 0")));
            }
        }
        if self.flush_interval_ms == 0 {
            return Err(ShardError::Config("flush_interval_ms must be greater than 0".into()));
        }
        if self.max_wal_segment_bytes == 0 {
            return Err(ShardError::Config("max_wal_segment_bytes must be greater than 0".into()));
        }
        if self.hashes_per_shingle < 2 {
            return Err(ShardError::Config("hashes_per_shingle must be at least 2".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ShardConfig::new("/tmp/strobe");
        config.validate().unwrap();
        assert_eq!(config.wal_dir(), PathBuf::from("/tmp/strobe/shard-0/wal"));
        assert_eq!(config.flush_interval(), Duration::from_millis(5));
    }

    #[test]
    fn test_ownership_is_modulo() {
        let mut config = ShardConfig::new("/tmp/strobe");
        config.shard_count = 4;
        config.shard_id = 2;
        assert!(config.owns(2));
        assert!(config.owns(6));
        assert!(!config.owns(7));
        assert_eq!(config.owner_of(7), 3);
    }

    #[test]
    fn test_rejects_bad_identity() {
        let mut config = ShardConfig::new("/tmp/strobe");
        config.shard_count = 2;
        config.shard_id = 2;
        assert!(matches!(config.validate(), Err(ShardError::Config(_))));
        config.shard_count = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_thresholds() {
        let mut config = ShardConfig::new("/tmp/strobe");
        config.flush_docs = 0;
        let message = config.validate().unwrap_err().to_string();
        assert!(message.contains("flush_docs"));
    }
}
