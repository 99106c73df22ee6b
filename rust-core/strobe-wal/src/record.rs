// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// Strobe Write-Ahead Log - Record types
//
// Defines the WAL record struct and its body enum (document or checkpoint).
// Provides binary serialization/deserialization for the on-disk format with
// CRC32 integrity checking.
//
// On-disk binary format (all integers little-endian):
//   [4 bytes: record_length (u32)]  -- length of everything after this field
//   [4 bytes: crc32 checksum]       -- CRC32 of all bytes after this field
//   [8 bytes: sequence (u64)]
//   [8 bytes: timestamp (i64)]      -- Unix milliseconds UTC
//   [1 byte:  kind]                 -- 0=Document, 1=Checkpoint
//   [8 bytes: subject (u64)]        -- doc_id, or covered sequence for checkpoints
//   [2 bytes: word_count (u16)]     -- signature words (0 for checkpoints)
//   [word_count * 8 bytes: signature words]

use chrono::{DateTime, TimeZone, Utc};
use crc32fast::Hasher as Crc32Hasher;
use strobe_signature::{Signature, SIGNATURE_WORDS};

use crate::error::{WalError, WalResult};

/// Size of the fixed-length record header prefix (record_length + crc32).
pub const HEADER_PREFIX_SIZE: usize = 4 + 4;

/// Size of the fixed fields after the CRC (sequence + timestamp + kind +
/// subject + word_count).
pub const FIXED_FIELDS_SIZE: usize = 8 + 8 + 1 + 8 + 2;

/// Encoded size of a document record, including the length prefix.
pub const DOCUMENT_RECORD_SIZE: usize = HEADER_PREFIX_SIZE + FIXED_FIELDS_SIZE + SIGNATURE_WORDS * 8;

/// Encoded size of a checkpoint record, including the length prefix.
pub const CHECKPOINT_RECORD_SIZE: usize = HEADER_PREFIX_SIZE + FIXED_FIELDS_SIZE;

/// Largest `record_length` value accepted. Anything bigger cannot have been
/// written by this deployment and is treated as corruption.
pub const MAX_RECORD_LENGTH: u32 = (DOCUMENT_RECORD_SIZE - 4) as u32;

/// Smallest `record_length` value accepted.
pub const MIN_RECORD_LENGTH: u32 = (CHECKPOINT_RECORD_SIZE - 4) as u32;

// ---------------------------------------------------------------------------
// RecordKind
// ---------------------------------------------------------------------------

/// Discriminant byte of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// A document ingested into the shard.
    Document = 0,
    /// A flush barrier; every earlier record is durable and indexed.
    Checkpoint = 1,
}

impl RecordKind {
    /// Decode a single byte into a `RecordKind`.
    pub fn from_byte(byte: u8) -> WalResult<Self> {
        match byte {
            0 => Ok(Self::Document),
            1 => Ok(Self::Checkpoint),
            other => Err(WalError::InvalidRecordKind(other)),
        }
    }

    /// Encode this kind as a single byte.
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

// ---------------------------------------------------------------------------
// WalRecord
// ---------------------------------------------------------------------------

/// Payload of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordBody {
    /// A committed-to-log document.
    Document {
        /// Caller-assigned document identifier.
        doc_id: u64,
        /// The document's signature.
        signature: Signature,
    },
    /// Flush barrier covering every record up to `covered_sequence`.
    Checkpoint {
        /// Highest sequence included in the flush.
        covered_sequence: u64,
    },
}

impl RecordBody {
    /// The kind byte for this body.
    pub fn kind(&self) -> RecordKind {
        match self {
            RecordBody::Document { .. } => RecordKind::Document,
            RecordBody::Checkpoint { .. } => RecordKind::Checkpoint,
        }
    }
}

/// A single record in the write-ahead log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalRecord {
    /// Gap-free, strictly increasing sequence number assigned by the writer.
    pub sequence: u64,

    /// UTC timestamp of when the record was appended.
    pub timestamp: DateTime<Utc>,

    /// What the record carries.
    pub body: RecordBody,
}

impl WalRecord {
    /// Create a document record. The sequence is assigned on append.
    pub fn document(doc_id: u64, signature: Signature) -> Self {
        Self {
            sequence: 0,
            timestamp: Utc::now(),
            body: RecordBody::Document { doc_id, signature },
        }
    }

    /// Create a checkpoint record. The sequence is assigned on append.
    pub fn checkpoint(covered_sequence: u64) -> Self {
        Self {
            sequence: 0,
            timestamp: Utc::now(),
            body: RecordBody::Checkpoint { covered_sequence },
        }
    }

    /// Serialize this record to the on-disk binary format.
    ///
    /// Returns the complete byte buffer including the length prefix and CRC.
    pub fn serialize(&self) -> Vec<u8> {
        let (subject, signature) = match &self.body {
            RecordBody::Document { doc_id, signature } => (*doc_id, Some(signature)),
            RecordBody::Checkpoint { covered_sequence } => (*covered_sequence, None),
        };
        let word_count = signature.map_or(0, |_| SIGNATURE_WORDS);

        let mut inner = Vec::with_capacity(FIXED_FIELDS_SIZE + word_count * 8);
        inner.extend_from_slice(&self.sequence.to_le_bytes());
        inner.extend_from_slice(&self.timestamp.timestamp_millis().to_le_bytes());
        inner.push(self.body.kind().to_byte());
        inner.extend_from_slice(&subject.to_le_bytes());
        inner.extend_from_slice(&(word_count as u16).to_le_bytes());
        if let Some(signature) = signature {
            signature.write_le_bytes(&mut inner);
        }

        let crc = compute_crc32(&inner);

        // Build the final buffer: [record_length][crc32][inner...].
        let record_length = (4 + inner.len()) as u32;
        let mut buffer = Vec::with_capacity(4 + record_length as usize);
        buffer.extend_from_slice(&record_length.to_le_bytes());
        buffer.extend_from_slice(&crc.to_le_bytes());
        buffer.extend_from_slice(&inner);
        buffer
    }

    /// Deserialize a record from a byte slice that starts immediately after
    /// the record_length field (i.e., begins with the CRC32 bytes).
    ///
    /// `record_length` is passed separately so the caller can validate
    /// its bounds before slicing.
    pub fn deserialize(data: &[u8], record_length: u32) -> WalResult<Self> {
        if !(MIN_RECORD_LENGTH..=MAX_RECORD_LENGTH).contains(&record_length) {
            return Err(WalError::RecordTooLarge {
                length: record_length,
                max_length: MAX_RECORD_LENGTH,
            });
        }
        if data.len() < record_length as usize {
            return Err(WalError::UnexpectedEof(data.len() as u64));
        }
        let data = &data[..record_length as usize];

        let stored_crc = read_u32(data, 0)?;
        let inner = &data[4..];

        let computed_crc = compute_crc32(inner);
        if stored_crc != computed_crc {
            // Best-effort sequence for the error message.
            let sequence = read_u64(inner, 0).unwrap_or(0);
            return Err(WalError::CrcMismatch {
                sequence,
                expected: stored_crc,
                actual: computed_crc,
            });
        }

        Self::parse_inner(inner)
    }

    /// Parse the inner content bytes (after CRC verification).
    fn parse_inner(inner: &[u8]) -> WalResult<Self> {
        let sequence = read_u64(inner, 0)?;
        let timestamp_millis = read_u64(inner, 8)? as i64;
        let timestamp = Utc
            .timestamp_millis_opt(timestamp_millis)
            .single()
            .unwrap_or_else(Utc::now);
        let kind = RecordKind::from_byte(*inner.get(16).ok_or(WalError::UnexpectedEof(16))?)?;
        let subject = read_u64(inner, 17)?;
        let word_count = read_u16(inner, 25)? as usize;
        let words_start = FIXED_FIELDS_SIZE;

        let body = match kind {
            RecordKind::Document => {
                if word_count != SIGNATURE_WORDS {
                    return Err(WalError::WidthMismatch {
                        expected: SIGNATURE_WORDS,
                        actual: word_count,
                    });
                }
                let words = inner
                    .get(words_start..words_start + word_count * 8)
                    .ok_or(WalError::UnexpectedEof(words_start as u64))?;
                let signature = Signature::from_le_bytes(words).map_err(|_| {
                    WalError::WidthMismatch {
                        expected: SIGNATURE_WORDS,
                        actual: words.len() / 8,
                    }
                })?;
                RecordBody::Document {
                    doc_id: subject,
                    signature,
                }
            }
            RecordKind::Checkpoint => {
                if word_count != 0 {
                    return Err(WalError::WidthMismatch {
                        expected: 0,
                        actual: word_count,
                    });
                }
                RecordBody::Checkpoint {
                    covered_sequence: subject,
                }
            }
        };

        if inner.len() != words_start + word_count * 8 {
            return Err(WalError::UnexpectedEof(inner.len() as u64));
        }

        Ok(Self {
            sequence,
            timestamp,
            body,
        })
    }
}

fn read_u16(data: &[u8], offset: usize) -> WalResult<u16> {
    let bytes = data
        .get(offset..offset + 2)
        .ok_or(WalError::UnexpectedEof(offset as u64))?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn read_u32(data: &[u8], offset: usize) -> WalResult<u32> {
    let bytes = data
        .get(offset..offset + 4)
        .ok_or(WalError::UnexpectedEof(offset as u64))?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_u64(data: &[u8], offset: usize) -> WalResult<u64> {
    let bytes = data
        .get(offset..offset + 8)
        .ok_or(WalError::UnexpectedEof(offset as u64))?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(bytes);
    Ok(u64::from_le_bytes(raw))
}

/// Compute a CRC32 checksum over the given byte slice using the IEEE
/// polynomial (same as zlib/gzip).
pub fn compute_crc32(data: &[u8]) -> u32 {
    let mut hasher = Crc32Hasher::new();
    hasher.update(data);
    hasher.finalize()
}
