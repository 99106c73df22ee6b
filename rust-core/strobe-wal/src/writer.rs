// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// Strobe Write-Ahead Log - Append-only writer
//
// The `WalWriter` appends records to the current segment file, rotates
// segments, and decides when the configured `SyncPolicy` requires an fsync.
//
// The fsync itself is not performed inside `append`. When a sync is due,
// `append` hands back a `PendingSync` ticket holding a cloned file handle;
// the caller releases whatever lock guards the writer and then completes
// the ticket. Only the copy-and-advance step is serialized.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use strobe_signature::Signature;

use crate::error::{WalError, WalResult};
use crate::reader::scan_segment;
use crate::record::WalRecord;
use crate::segment::{list_segments, segment_path, SegmentInfo, DEFAULT_MAX_SEGMENT_SIZE};

/// Sequence number of the first record of a fresh WAL.
pub const FIRST_SEQUENCE: u64 = 1;

/// Default coalescing window (1 MiB).
pub const DEFAULT_COALESCE_BYTES: u64 = 1 << 20;

// ---------------------------------------------------------------------------
// SyncPolicy
// ---------------------------------------------------------------------------

/// Controls how aggressively the WAL writer calls `fsync` to flush data to
/// stable storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SyncPolicy {
    /// Sync after every single append. Acknowledged writes survive a crash.
    Always,

    /// Sync once at least this many bytes have accumulated since the last
    /// sync. At most the unsynced tail is lost on crash; synced state is
    /// never affected.
    Coalesce {
        /// Byte threshold that triggers a sync.
        bytes: u64,
    },

    /// Never explicitly sync; rely on the OS page cache. Checkpoints and
    /// rotations still sync.
    Never,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        SyncPolicy::Coalesce {
            bytes: DEFAULT_COALESCE_BYTES,
        }
    }
}

impl FromStr for SyncPolicy {
    type Err = WalError;

    /// Parse `always`, `never`, `coalesce` or `coalesce:<bytes>`.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        match trimmed {
            "always" => Ok(SyncPolicy::Always),
            "never" => Ok(SyncPolicy::Never),
            "coalesce" => Ok(SyncPolicy::default()),
            other => {
                let bytes = other
                    .strip_prefix("coalesce:")
                    .and_then(|n| n.trim().parse::<u64>().ok())
                    .filter(|n| *n > 0)
                    .ok_or_else(|| WalError::InvalidSyncPolicy(raw.to_string()))?;
                Ok(SyncPolicy::Coalesce { bytes })
            }
        }
    }
}

impl fmt::Display for SyncPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncPolicy::Always => write!(f, "always"),
            SyncPolicy::Never => write!(f, "never"),
            SyncPolicy::Coalesce { bytes } => write!(f, "coalesce:{bytes}"),
        }
    }
}

impl TryFrom<String> for SyncPolicy {
    type Error = WalError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        raw.parse()
    }
}

impl From<SyncPolicy> for String {
    fn from(policy: SyncPolicy) -> Self {
        policy.to_string()
    }
}

// ---------------------------------------------------------------------------
// Durable position tracking
// ---------------------------------------------------------------------------

/// A point in the log known to be on stable storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DurablePosition {
    /// Start sequence of the segment the position lies in.
    pub segment_start: u64,
    /// Byte length of that segment covered by the sync.
    pub offset: u64,
    /// Highest record sequence covered (0 when nothing is durable yet).
    pub sequence: u64,
}

/// Shared high-water mark of durable data. Completed syncs may finish out
/// of order, so the mark only moves forward.
#[derive(Debug, Default)]
struct DurableMark {
    position: Mutex<DurablePosition>,
}

impl DurableMark {
    fn advance(&self, candidate: DurablePosition) {
        let mut current = self.position.lock();
        if (candidate.sequence, candidate.segment_start, candidate.offset)
            > (current.sequence, current.segment_start, current.offset)
        {
            *current = candidate;
        }
    }

    fn get(&self) -> DurablePosition {
        *self.position.lock()
    }
}

/// An fsync owed by a completed append.
///
/// Completing the ticket syncs the segment file the append went to and
/// advances the writer's durable mark. Dropping it without completing
/// leaves the data in the page cache only.
#[must_use = "the appended data is not durable until the sync is completed"]
pub struct PendingSync {
    file: File,
    position: DurablePosition,
    mark: Arc<DurableMark>,
}

impl PendingSync {
    /// The position this sync will make durable.
    pub fn position(&self) -> DurablePosition {
        self.position
    }

    /// Perform the fsync.
    pub fn complete(self) -> WalResult<DurablePosition> {
        self.file.sync_data()?;
        self.mark.advance(self.position);
        debug!(sequence = self.position.sequence, "WAL sync completed");
        Ok(self.position)
    }
}

impl fmt::Debug for PendingSync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingSync")
            .field("position", &self.position)
            .finish()
    }
}

/// Result of a successful append.
#[derive(Debug)]
pub struct Appended {
    /// Sequence assigned to the record.
    pub sequence: u64,
    /// Present when the sync policy requires an fsync now.
    pub pending_sync: Option<PendingSync>,
}

impl Appended {
    /// Complete any owed sync immediately.
    pub fn sync_now(self) -> WalResult<u64> {
        if let Some(pending) = self.pending_sync {
            pending.complete()?;
        }
        Ok(self.sequence)
    }
}

// ---------------------------------------------------------------------------
// WalWriter
// ---------------------------------------------------------------------------

/// An append-only writer for WAL segment files.
///
/// The writer maintains a gap-free sequence counter and automatically
/// rotates to a new segment file when the current one would exceed
/// `max_segment_size`.
pub struct WalWriter {
    /// The directory containing all WAL segment files.
    wal_dir: PathBuf,

    /// The currently open segment file handle.
    current_file: File,

    /// Metadata about the current segment.
    current_segment: SegmentInfo,

    /// Sequence number the next record receives.
    next_sequence: u64,

    /// Maximum size (in bytes) of a single segment before rotation.
    max_segment_size: u64,

    /// When fsync is owed.
    policy: SyncPolicy,

    /// Bytes written since the last sync was handed out.
    unsynced_bytes: u64,

    /// Durable high-water mark, shared with outstanding `PendingSync`s.
    durable: Arc<DurableMark>,

    /// Set when a write failed part-way.
    poisoned: bool,
}

impl WalWriter {
    /// Open an existing WAL directory or initialize a new one.
    ///
    /// If the directory already contains segment files, the writer resumes
    /// after the last valid record of the last segment. The directory must
    /// already have been through [`crate::WalReader::recover`]; a torn or
    /// corrupt tail is reported as an error rather than appended after.
    ///
    /// # Arguments
    ///
    /// * `wal_dir` - Path to the WAL directory. Created if it does not exist.
    /// * `policy` - Controls fsync behavior.
    pub fn open(wal_dir: impl AsRef<Path>, policy: SyncPolicy) -> WalResult<Self> {
        Self::open_with_max_size(wal_dir, policy, DEFAULT_MAX_SEGMENT_SIZE)
    }

    /// Open the WAL directory with a custom maximum segment size.
    ///
    /// This is primarily useful for testing with small segment sizes.
    pub fn open_with_max_size(
        wal_dir: impl AsRef<Path>,
        policy: SyncPolicy,
        max_segment_size: u64,
    ) -> WalResult<Self> {
        let wal_dir = wal_dir.as_ref().to_path_buf();

        if !wal_dir.exists() {
            fs::create_dir_all(&wal_dir)?;
            info!(dir = %wal_dir.display(), "Created WAL directory");
        }

        let segments = list_segments(&wal_dir)?;

        let (current_segment, current_file, next_sequence) = match segments.last() {
            None => {
                let path = segment_path(&wal_dir, FIRST_SEQUENCE);
                let file = File::create(&path)?;
                let segment = SegmentInfo {
                    path,
                    start_sequence: FIRST_SEQUENCE,
                    file_size: 0,
                };
                info!(next_sequence = FIRST_SEQUENCE, "Initialized fresh WAL");
                (segment, file, FIRST_SEQUENCE)
            }
            Some(last) => {
                let scan = scan_segment(&last.path, Some(last.start_sequence))?;
                if let Some(stop) = scan.stop {
                    return Err(stop.error);
                }
                let next_sequence = scan
                    .records
                    .last()
                    .map_or(last.start_sequence, |r| r.sequence + 1);
                let file = OpenOptions::new().append(true).open(&last.path)?;
                info!(
                    segment = %last.path.display(),
                    next_sequence,
                    "Resuming WAL"
                );
                (last.clone(), file, next_sequence)
            }
        };

        // Whatever survived on disk is the durable baseline.
        current_file.sync_all()?;
        let durable = Arc::new(DurableMark::default());
        durable.advance(DurablePosition {
            segment_start: current_segment.start_sequence,
            offset: current_segment.file_size,
            sequence: next_sequence - 1,
        });

        Ok(Self {
            wal_dir,
            current_file,
            current_segment,
            next_sequence,
            max_segment_size,
            policy,
            unsynced_bytes: 0,
            durable,
            poisoned: false,
        })
    }

    /// Append a document record.
    pub fn append_document(&mut self, doc_id: u64, signature: Signature) -> WalResult<Appended> {
        self.append(WalRecord::document(doc_id, signature))
    }

    /// Append a record.
    ///
    /// The record's `sequence` field is overwritten with the next sequence
    /// number. The counter only advances once the bytes are written, so a
    /// failed write never leaves a gap.
    pub fn append(&mut self, mut record: WalRecord) -> WalResult<Appended> {
        if self.poisoned {
            return Err(WalError::Poisoned);
        }

        let sequence = self.next_sequence;
        record.sequence = sequence;
        let bytes = record.serialize();

        if self.current_segment.file_size > 0
            && self.current_segment.file_size + bytes.len() as u64 > self.max_segment_size
        {
            self.rotate()?;
        }

        if let Err(err) = self.current_file.write_all(&bytes) {
            self.poisoned = true;
            error!(sequence, error = %err, "WAL append failed; writer poisoned");
            return Err(err.into());
        }
        self.current_segment.file_size += bytes.len() as u64;
        self.unsynced_bytes += bytes.len() as u64;
        self.next_sequence += 1;

        let pending_sync = self.sync_due().then(|| self.pending_sync()).transpose()?;

        debug!(sequence, bytes = bytes.len(), "Appended WAL record");

        Ok(Appended {
            sequence,
            pending_sync,
        })
    }

    /// Force an immediate `fsync` of the current segment file, regardless
    /// of the configured `SyncPolicy`.
    pub fn sync(&mut self) -> WalResult<DurablePosition> {
        if let Err(err) = self.current_file.sync_all() {
            self.poisoned = true;
            return Err(err.into());
        }
        self.unsynced_bytes = 0;
        let position = self.position();
        self.durable.advance(position);
        Ok(position)
    }

    /// Write a checkpoint record and sync.
    ///
    /// A checkpoint marks a point in the log where every preceding record
    /// is on stable storage and has been materialized into the index. It is
    /// the durability barrier of a flush.
    ///
    /// Returns the sequence number of the checkpoint record.
    pub fn checkpoint(&mut self) -> WalResult<u64> {
        let (sequence, _) = self.begin_checkpoint()?;
        // Covers the ticket's segment and anything a rotation left unsynced.
        self.sync()?;
        Ok(sequence)
    }

    /// Append a checkpoint record and hand back the sync that makes it
    /// durable, whatever the policy says.
    ///
    /// Earlier segments were synced when they were rotated out, so
    /// completing the ticket makes every record up to the checkpoint durable.
    pub fn begin_checkpoint(&mut self) -> WalResult<(u64, PendingSync)> {
        let covered = self.next_sequence - 1;
        let appended = self.append(WalRecord::checkpoint(covered))?;
        let pending = match appended.pending_sync {
            Some(pending) => pending,
            None => self.pending_sync()?,
        };

        info!(sequence = appended.sequence, covered, "WAL checkpoint written");

        Ok((appended.sequence, pending))
    }

    /// Rotate to a new segment file.
    ///
    /// The current segment is fsynced and closed, and a new segment file is
    /// created starting at the current `next_sequence` value.
    pub fn rotate(&mut self) -> WalResult<()> {
        self.sync()?;

        let new_start = self.next_sequence;
        let new_path = segment_path(&self.wal_dir, new_start);
        let new_file = File::create(&new_path)?;

        info!(
            old_segment = %self.current_segment.path.display(),
            new_segment = %new_path.display(),
            start_sequence = new_start,
            "Rotated WAL segment"
        );

        self.current_file = new_file;
        self.current_segment = SegmentInfo {
            path: new_path,
            start_sequence: new_start,
            file_size: 0,
        };

        Ok(())
    }

    /// Returns the sequence number that will be assigned to the next record.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Highest sequence written so far (0 if none).
    pub fn last_sequence(&self) -> u64 {
        self.next_sequence - 1
    }

    /// Returns the path to the WAL directory.
    pub fn wal_dir(&self) -> &Path {
        &self.wal_dir
    }

    /// Returns a reference to the current segment's metadata.
    pub fn current_segment(&self) -> &SegmentInfo {
        &self.current_segment
    }

    /// The configured sync policy.
    pub fn policy(&self) -> SyncPolicy {
        self.policy
    }

    /// The furthest point known to be on stable storage.
    pub fn durable(&self) -> DurablePosition {
        self.durable.get()
    }

    /// Bytes appended since the last sync was due.
    pub fn unsynced_bytes(&self) -> u64 {
        self.unsynced_bytes
    }

    /// Whether a failed write has disabled this writer.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    fn position(&self) -> DurablePosition {
        DurablePosition {
            segment_start: self.current_segment.start_sequence,
            offset: self.current_segment.file_size,
            sequence: self.next_sequence - 1,
        }
    }

    /// Whether the policy owes a sync after the append just made.
    fn sync_due(&self) -> bool {
        match self.policy {
            SyncPolicy::Always => true,
            SyncPolicy::Coalesce { bytes } => self.unsynced_bytes >= bytes,
            SyncPolicy::Never => false,
        }
    }

    fn pending_sync(&mut self) -> WalResult<PendingSync> {
        let file = self.current_file.try_clone()?;
        self.unsynced_bytes = 0;
        Ok(PendingSync {
            file,
            position: self.position(),
            mark: Arc::clone(&self.durable),
        })
    }
}
