// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// Strobe Write-Ahead Log - Segment management
//
// Each WAL segment is a single append-only file named `wal-{sequence:016}.log`,
// where the number is the sequence of the first record it holds. Segments
// are rotated when they exceed the configured maximum size. Segments that
// follow a corrupted record are renamed to `*.log.corrupt` during recovery
// so they are never replayed and never silently deleted. A name that is
// already taken gets a numeric suffix (`*.log.corrupt.1`, `.2`, ...) so
// earlier evidence is never overwritten.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{WalError, WalResult};

/// Default maximum segment size in bytes (64 MiB).
pub const DEFAULT_MAX_SEGMENT_SIZE: u64 = 64 * 1024 * 1024;

/// The file extension used for WAL segment files.
pub const SEGMENT_EXTENSION: &str = "log";

/// The prefix used for WAL segment file names.
pub const SEGMENT_PREFIX: &str = "wal-";

/// Suffix appended to quarantined segments.
pub const QUARANTINE_SUFFIX: &str = "corrupt";

/// Metadata about a single WAL segment file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentInfo {
    /// The full path to the segment file on disk.
    pub path: PathBuf,

    /// The starting sequence number encoded in the file name.
    /// All records in this segment have sequence >= this value.
    pub start_sequence: u64,

    /// Current file size in bytes.
    pub file_size: u64,
}

impl SegmentInfo {
    /// Returns `true` if the segment file has reached or exceeded the given
    /// maximum size in bytes.
    pub fn is_full(&self, max_size: u64) -> bool {
        self.file_size >= max_size
    }
}

impl PartialOrd for SegmentInfo {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SegmentInfo {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.start_sequence.cmp(&other.start_sequence)
    }
}

/// Build the canonical file name for a segment starting at the given
/// sequence number.
///
/// Format: `wal-0000000000000001.log`
pub fn segment_filename(start_sequence: u64) -> String {
    format!("{SEGMENT_PREFIX}{start_sequence:016}.{SEGMENT_EXTENSION}")
}

/// Build the full path for a segment file in the given WAL directory.
pub fn segment_path(wal_dir: &Path, start_sequence: u64) -> PathBuf {
    wal_dir.join(segment_filename(start_sequence))
}

/// Parse the starting sequence number from a segment file name.
///
/// Returns `None` if the name does not match the expected pattern.
pub fn parse_segment_filename(name: &str) -> Option<u64> {
    let stripped = name.strip_prefix(SEGMENT_PREFIX)?;
    let num_str = stripped.strip_suffix(&format!(".{SEGMENT_EXTENSION}"))?;
    if num_str.is_empty() || !num_str.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    num_str.parse::<u64>().ok()
}

/// Scan a WAL directory and return metadata for all segment files, sorted
/// by starting sequence number (ascending).
///
/// Non-segment files (including quarantined segments) are ignored.
pub fn list_segments(wal_dir: &Path) -> WalResult<Vec<SegmentInfo>> {
    if !wal_dir.is_dir() {
        return Err(WalError::DirectoryNotFound(wal_dir.display().to_string()));
    }

    let mut segments = Vec::new();

    for dir_entry in fs::read_dir(wal_dir)? {
        let dir_entry = dir_entry?;
        let file_name = dir_entry.file_name();
        let name = file_name.to_string_lossy();

        if let Some(start_sequence) = parse_segment_filename(&name) {
            let metadata = dir_entry.metadata()?;
            segments.push(SegmentInfo {
                path: dir_entry.path(),
                start_sequence,
                file_size: metadata.len(),
            });
        }
    }

    segments.sort();

    debug!(
        count = segments.len(),
        dir = %wal_dir.display(),
        "Discovered WAL segments"
    );

    Ok(segments)
}

/// First free quarantine name for `path`: `<path>.corrupt`, then
/// `<path>.corrupt.1`, `<path>.corrupt.2` and so on.
pub fn quarantine_path(path: &Path) -> WalResult<PathBuf> {
    let mut base = path.as_os_str().to_os_string();
    base.push(format!(".{QUARANTINE_SUFFIX}"));
    let base = PathBuf::from(base);
    if !base.try_exists()? {
        return Ok(base);
    }
    for n in 1u32.. {
        let mut candidate = base.clone().into_os_string();
        candidate.push(format!(".{n}"));
        let candidate = PathBuf::from(candidate);
        if !candidate.try_exists()? {
            return Ok(candidate);
        }
    }
    Err(WalError::Io(std::io::Error::new(
        std::io::ErrorKind::AlreadyExists,
        format!("no free quarantine name for {}", path.display()),
    )))
}

/// Rename a segment out of the replay set. Returns the new path.
///
/// Never replaces an existing quarantined file.
pub fn quarantine_segment(segment: &SegmentInfo) -> WalResult<PathBuf> {
    let target = quarantine_path(&segment.path)?;
    fs::rename(&segment.path, &target)?;
    warn!(
        from = %segment.path.display(),
        to = %target.display(),
        start_sequence = segment.start_sequence,
        "Quarantined WAL segment following corruption"
    );
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    fn create_segment(dir: &Path, start_seq: u64, size_bytes: usize) -> PathBuf {
        let file_path = segment_path(dir, start_seq);
        let mut file = File::create(&file_path).unwrap();
        file.write_all(&vec![0u8; size_bytes]).unwrap();
        file_path
    }

    #[test]
    fn test_segment_filename_format() {
        assert_eq!(segment_filename(0), "wal-0000000000000000.log");
        assert_eq!(segment_filename(1), "wal-0000000000000001.log");
        assert_eq!(
            segment_filename(9_999_999_999_999_999),
            "wal-9999999999999999.log"
        );
    }

    #[test]
    fn test_parse_segment_filename_valid() {
        assert_eq!(parse_segment_filename("wal-0000000000000042.log"), Some(42));
        assert_eq!(parse_segment_filename("wal-0000000000000000.log"), Some(0));
    }

    #[test]
    fn test_parse_segment_filename_invalid() {
        assert_eq!(parse_segment_filename("not-a-segment.txt"), None);
        assert_eq!(parse_segment_filename("wal-.log"), None);
        assert_eq!(parse_segment_filename("wal-abc.log"), None);
        assert_eq!(parse_segment_filename("wal-+12.log"), None);
        assert_eq!(parse_segment_filename("wal-0000000000000042.log.corrupt"), None);
        assert_eq!(parse_segment_filename(""), None);
    }

    #[test]
    fn test_list_segments_sorted() {
        let dir = TempDir::new().unwrap();
        create_segment(dir.path(), 100, 1024);
        create_segment(dir.path(), 1, 512);
        create_segment(dir.path(), 50, 2048);

        // Create a non-segment file that should be ignored.
        File::create(dir.path().join("readme.txt")).unwrap();

        let segments = list_segments(dir.path()).unwrap();
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].start_sequence, 1);
        assert_eq!(segments[0].file_size, 512);
        assert_eq!(segments[1].start_sequence, 50);
        assert_eq!(segments[2].start_sequence, 100);
    }

    #[test]
    fn test_list_segments_nonexistent_dir() {
        let result = list_segments(Path::new("/nonexistent/wal/dir"));
        assert!(matches!(result, Err(WalError::DirectoryNotFound(_))));
    }

    #[test]
    fn test_segment_info_is_full() {
        let info = SegmentInfo {
            path: PathBuf::from("test.log"),
            start_sequence: 0,
            file_size: DEFAULT_MAX_SEGMENT_SIZE,
        };
        assert!(info.is_full(DEFAULT_MAX_SEGMENT_SIZE));
        assert!(!info.is_full(DEFAULT_MAX_SEGMENT_SIZE + 1));
    }

    #[test]
    fn test_quarantine_removes_from_listing() {
        let dir = TempDir::new().unwrap();
        create_segment(dir.path(), 1, 10);
        create_segment(dir.path(), 7, 10);

        let segments = list_segments(dir.path()).unwrap();
        let moved = quarantine_segment(&segments[1]).unwrap();
        assert!(moved.exists());
        assert!(moved.to_string_lossy().ends_with(".log.corrupt"));

        let remaining = list_segments(dir.path()).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].start_sequence, 1);
    }

    #[test]
    fn test_quarantine_twice_keeps_both_files() {
        let dir = TempDir::new().unwrap();

        create_segment(dir.path(), 3, 10);
        let first = quarantine_segment(&list_segments(dir.path()).unwrap()[0]).unwrap();

        // Same start sequence written again after the first repair.
        create_segment(dir.path(), 3, 20);
        let second = quarantine_segment(&list_segments(dir.path()).unwrap()[0]).unwrap();

        assert_ne!(first, second);
        assert!(first.to_string_lossy().ends_with(".log.corrupt"));
        assert!(second.to_string_lossy().ends_with(".log.corrupt.1"));
        assert_eq!(fs::metadata(&first).unwrap().len(), 10);
        assert_eq!(fs::metadata(&second).unwrap().len(), 20);
        assert!(list_segments(dir.path()).unwrap().is_empty());
    }
}
