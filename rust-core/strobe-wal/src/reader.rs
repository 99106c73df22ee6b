// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// Strobe Write-Ahead Log - Reader for crash recovery
//
// The `WalReader` scans segment files in order and validates every record:
// length bounds, completeness, CRC32, kind, signature width and sequence
// continuity. Replay stops at the first record that fails any check.
//
// `recover()` additionally repairs the directory: the bytes from the bad
// record onward are copied to a `*.corrupt` sidecar, the segment is then
// truncated to its last valid byte and every later segment is quarantined.
// Nothing is deleted outright. Running it again on a repaired directory
// changes nothing.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::error::{WalError, WalResult};
use crate::record::{RecordBody, WalRecord, MAX_RECORD_LENGTH, MIN_RECORD_LENGTH};
use crate::segment::{list_segments, quarantine_path, quarantine_segment, SegmentInfo};

// ---------------------------------------------------------------------------
// Recovery outcome
// ---------------------------------------------------------------------------

/// Where recovery cut the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Truncation {
    /// Segment that held the first invalid record.
    pub segment: PathBuf,
    /// Byte offset of the first invalid record.
    pub offset: u64,
    /// Bytes removed from that segment.
    pub discarded_bytes: u64,
    /// Sidecar holding the removed bytes. `None` when the whole segment
    /// was quarantined instead of cut.
    pub preserved: Option<PathBuf>,
    /// Why the record was rejected.
    pub reason: String,
}

/// Everything recovery learned about the log.
#[derive(Debug, Default)]
pub struct Recovery {
    /// Valid records, in sequence order, with no gaps.
    pub records: Vec<WalRecord>,
    /// Set when a bad record was found and the log was cut.
    pub truncation: Option<Truncation>,
    /// Segments renamed out of the replay set.
    pub quarantined: Vec<PathBuf>,
    /// Sequence of the last checkpoint record, if any.
    pub last_checkpoint: Option<u64>,
}

impl Recovery {
    /// Highest valid sequence, or 0 for an empty log.
    pub fn last_sequence(&self) -> u64 {
        self.records.last().map_or(0, |r| r.sequence)
    }

    /// Iterate the recovered documents as `(doc_id, signature)` pairs.
    pub fn documents(&self) -> impl Iterator<Item = (u64, &strobe_signature::Signature)> {
        self.records.iter().filter_map(|record| match &record.body {
            RecordBody::Document { doc_id, signature } => Some((*doc_id, signature)),
            RecordBody::Checkpoint { .. } => None,
        })
    }

    /// Whether recovery had to repair anything.
    pub fn repaired(&self) -> bool {
        self.truncation.is_some() || !self.quarantined.is_empty()
    }
}

// ---------------------------------------------------------------------------
// WalReader
// ---------------------------------------------------------------------------

/// A reader that replays WAL records from segment files on disk.
pub struct WalReader {
    /// The WAL directory containing segment files.
    wal_dir: PathBuf,
}

impl WalReader {
    /// Open a WAL directory for reading.
    ///
    /// Does not read any data until `replay()` or `recover()` is called.
    pub fn open(wal_dir: impl AsRef<Path>) -> WalResult<Self> {
        let wal_dir = wal_dir.as_ref().to_path_buf();
        if !wal_dir.is_dir() {
            return Err(WalError::DirectoryNotFound(wal_dir.display().to_string()));
        }
        Ok(Self { wal_dir })
    }

    /// Read every valid record without touching the files.
    ///
    /// Stops at the first invalid record; nothing after it is returned.
    pub fn replay(&self) -> WalResult<Vec<WalRecord>> {
        let segments = list_segments(&self.wal_dir)?;
        let mut records = Vec::new();
        let mut expected = segments.first().map(|s| s.start_sequence);

        for segment in &segments {
            let scan = scan_in_place(segment, expected)?;
            expected = scan.next_expected(expected);
            records.extend(scan.records);
            if scan.stop.is_some() {
                break;
            }
        }

        debug!(count = records.len(), "Replayed WAL records");
        Ok(records)
    }

    /// Replay the log and repair it.
    ///
    /// On the first invalid or incomplete record the containing segment is
    /// truncated back to the last valid record and all later segments are
    /// quarantined. A bad segment whose very first record is invalid is
    /// quarantined whole unless it is the first segment.
    pub fn recover(&self) -> WalResult<Recovery> {
        let segments = list_segments(&self.wal_dir)?;
        let mut recovery = Recovery::default();
        let mut expected = segments.first().map(|s| s.start_sequence);

        for (index, segment) in segments.iter().enumerate() {
            let scan = scan_in_place(segment, expected)?;
            expected = scan.next_expected(expected);

            for record in &scan.records {
                if let RecordBody::Checkpoint { .. } = record.body {
                    recovery.last_checkpoint = Some(record.sequence);
                }
            }
            recovery.records.extend(scan.records);

            let Some(stop) = scan.stop else {
                continue;
            };

            warn!(
                segment = %segment.path.display(),
                offset = stop.offset,
                error = %stop.error,
                "Invalid WAL record; truncating log"
            );

            let (later, preserved) = if stop.offset == 0 && index > 0 {
                (&segments[index..], None)
            } else {
                let sidecar = truncate_segment(segment, stop.offset)?;
                (&segments[index + 1..], Some(sidecar))
            };
            for doomed in later {
                recovery.quarantined.push(quarantine_segment(doomed)?);
            }

            recovery.truncation = Some(Truncation {
                segment: segment.path.clone(),
                offset: stop.offset,
                discarded_bytes: segment.file_size - stop.offset,
                preserved,
                reason: stop.error.to_string(),
            });
            break;
        }

        info!(
            records = recovery.records.len(),
            last_sequence = recovery.last_sequence(),
            last_checkpoint = ?recovery.last_checkpoint,
            repaired = recovery.repaired(),
            "WAL recovery complete"
        );

        Ok(recovery)
    }

    /// Find the sequence number of the last checkpoint record in the WAL.
    pub fn find_last_checkpoint(&self) -> WalResult<Option<u64>> {
        Ok(self
            .replay()?
            .iter()
            .rev()
            .find(|r| matches!(r.body, RecordBody::Checkpoint { .. }))
            .map(|r| r.sequence))
    }
}

// ---------------------------------------------------------------------------
// Segment scanning
// ---------------------------------------------------------------------------

/// The first invalid record found in a segment.
#[derive(Debug)]
pub(crate) struct ScanStop {
    pub(crate) offset: u64,
    pub(crate) error: WalError,
}

/// Valid prefix of one segment.
#[derive(Debug)]
pub(crate) struct SegmentScan {
    pub(crate) records: Vec<WalRecord>,
    pub(crate) stop: Option<ScanStop>,
}

impl SegmentScan {
    fn next_expected(&self, current: Option<u64>) -> Option<u64> {
        self.records.last().map(|r| r.sequence + 1).or(current)
    }
}

fn scan_in_place(segment: &SegmentInfo, expected: Option<u64>) -> WalResult<SegmentScan> {
    // A segment is named after its first record; a mismatch means records
    // between the previous segment and this one are missing.
    if let Some(expected) = expected {
        if segment.start_sequence != expected {
            return Ok(SegmentScan {
                records: Vec::new(),
                stop: Some(ScanStop {
                    offset: 0,
                    error: WalError::SequenceGap {
                        expected,
                        found: segment.start_sequence,
                    },
                }),
            });
        }
    }
    scan_segment(&segment.path, expected)
}

/// Read the valid prefix of a single segment file.
///
/// When `expected` is given, the first record must carry that sequence and
/// each following record must increment it by one.
pub(crate) fn scan_segment(path: &Path, mut expected: Option<u64>) -> WalResult<SegmentScan> {
    let data = fs::read(path)?;
    let segment_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "<unknown>".to_string());

    let mut records = Vec::new();
    let mut offset = 0usize;

    let stop = loop {
        if offset == data.len() {
            break None;
        }

        let stop_at = |error| Some(ScanStop {
            offset: offset as u64,
            error,
        });

        let Some(length_bytes) = data.get(offset..offset + 4) else {
            break stop_at(WalError::TruncatedRecord {
                offset: offset as u64,
                segment: segment_name.clone(),
            });
        };
        let mut raw = [0u8; 4];
        raw.copy_from_slice(length_bytes);
        let record_length = u32::from_le_bytes(raw);

        if !(MIN_RECORD_LENGTH..=MAX_RECORD_LENGTH).contains(&record_length) {
            break stop_at(WalError::RecordTooLarge {
                length: record_length,
                max_length: MAX_RECORD_LENGTH,
            });
        }

        let record_end = offset + 4 + record_length as usize;
        if record_end > data.len() {
            break stop_at(WalError::TruncatedRecord {
                offset: offset as u64,
                segment: segment_name.clone(),
            });
        }

        let record = match WalRecord::deserialize(&data[offset + 4..record_end], record_length) {
            Ok(record) => record,
            Err(error) => break stop_at(error),
        };

        if let Some(want) = expected {
            if record.sequence != want {
                break stop_at(WalError::SequenceGap {
                    expected: want,
                    found: record.sequence,
                });
            }
        }
        expected = Some(record.sequence + 1);
        records.push(record);
        offset = record_end;
    };

    Ok(SegmentScan { records, stop })
}

/// Cut `segment` at `offset`, first copying the cut bytes to a sidecar.
/// Returns the sidecar path.
fn truncate_segment(segment: &SegmentInfo, offset: u64) -> WalResult<PathBuf> {
    let data = fs::read(&segment.path)?;
    let tail = data.get(offset as usize..).unwrap_or_default();

    let sidecar = quarantine_path(&segment.path)?;
    let mut out = OpenOptions::new().write(true).create_new(true).open(&sidecar)?;
    out.write_all(tail)?;
    out.sync_all()?;

    let file = OpenOptions::new().write(true).open(&segment.path)?;
    file.set_len(offset)?;
    file.sync_all()?;
    sync_parent(&segment.path)?;

    error!(
        segment = %segment.path.display(),
        offset,
        preserved_bytes = tail.len(),
        sidecar = %sidecar.display(),
        "Truncated WAL segment; cut bytes preserved"
    );
    Ok(sidecar)
}

fn sync_parent(path: &Path) -> WalResult<()> {
    if let Some(parent) = path.parent() {
        File::open(parent)?.sync_all()?;
    }
    Ok(())
}
