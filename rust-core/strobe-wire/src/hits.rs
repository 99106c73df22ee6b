// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// Strobe wire protocol - Hit response frame

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, ProtocolResult};

/// Bytes of the `count` header.
pub const HIT_HEADER_LEN: usize = 4;

/// Bytes per encoded hit (`doc_id` + `score`).
pub const HIT_ENTRY_LEN: usize = 8 + 4;

/// One result as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WireHit {
    /// Matching document.
    pub doc_id: u64,
    /// Similarity in `[0, 1]`.
    pub score: f32,
}

/// Encode hits in the order given.
pub fn encode_hits(hits: &[WireHit]) -> Bytes {
    let mut buf = BytesMut::with_capacity(HIT_HEADER_LEN + hits.len() * HIT_ENTRY_LEN);
    buf.put_u32_le(hits.len() as u32);
    for hit in hits {
        buf.put_u64_le(hit.doc_id);
        buf.put_f32_le(hit.score);
    }
    buf.freeze()
}

/// Decode a hit frame produced by [`encode_hits`].
pub fn decode_hits(frame: &[u8]) -> ProtocolResult<Vec<WireHit>> {
    if frame.len() < HIT_HEADER_LEN {
        return Err(ProtocolError::TruncatedHits {
            declared: 0,
            actual: frame.len(),
        });
    }
    let declared = u32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]);
    let body = &frame[HIT_HEADER_LEN..];
    if body.len() != declared as usize * HIT_ENTRY_LEN {
        return Err(ProtocolError::TruncatedHits {
            declared,
            actual: body.len(),
        });
    }

    let hits = body
        .chunks_exact(HIT_ENTRY_LEN)
        .map(|entry| {
            let mut doc_id = [0u8; 8];
            doc_id.copy_from_slice(&entry[..8]);
            let mut score = [0u8; 4];
            score.copy_from_slice(&entry[8..]);
            WireHit {
                doc_id: u64::from_le_bytes(doc_id),
                score: f32::from_le_bytes(score),
            }
        })
        .collect();
    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_frame() {
        let frame = encode_hits(&[]);
        assert_eq!(&frame[..], &[0, 0, 0, 0]);
        assert!(decode_hits(&frame).unwrap().is_empty());
    }

    #[test]
    fn test_hits_roundtrip_preserves_order() {
        let hits = vec![
            WireHit {
                doc_id: 9,
                score: 1.0,
            },
            WireHit {
                doc_id: 2,
                score: 0.75,
            },
        ];
        let frame = encode_hits(&hits);
        assert_eq!(frame.len(), HIT_HEADER_LEN + 2 * HIT_ENTRY_LEN);
        assert_eq!(decode_hits(&frame).unwrap(), hits);
    }

    #[test]
    fn test_truncated_frame_rejected() {
        let frame = encode_hits(&[WireHit {
            doc_id: 1,
            score: 0.5,
        }]);
        let err = decode_hits(&frame[..frame.len() - 1]).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::TruncatedHits {
                declared: 1,
                actual: HIT_ENTRY_LEN - 1
            }
        );
        assert!(decode_hits(&[1, 0]).is_err());
    }
}
