// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// Strobe wire protocol - Query frame codec

use bytes::{BufMut, Bytes, BytesMut};
use strobe_signature::{Signature, SIGNATURE_BYTES};

use crate::error::{ProtocolError, ProtocolResult};
use crate::flags::QueryFlags;

/// Bytes before the signature words (`k` + `flags`).
pub const QUERY_HEADER_LEN: usize = 4;

/// The only accepted query frame length.
pub const QUERY_FRAME_LEN: usize = QUERY_HEADER_LEN + SIGNATURE_BYTES;

/// A decoded search request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    /// Maximum number of results; always >= 1 once validated.
    pub k: u16,
    /// Matching mode.
    pub flags: QueryFlags,
    /// Query signature.
    pub signature: Signature,
}

impl Query {
    /// Build a query, rejecting `k == 0`.
    pub fn new(k: u16, flags: QueryFlags, signature: Signature) -> ProtocolResult<Self> {
        if k == 0 {
            return Err(ProtocolError::ZeroK);
        }
        Ok(Self {
            k,
            flags,
            signature,
        })
    }

    /// Exact-mode query.
    pub fn exact(k: u16, signature: Signature) -> ProtocolResult<Self> {
        Self::new(k, QueryFlags::EXACT, signature)
    }

    /// Fuzzy-mode query.
    pub fn fuzzy(k: u16, signature: Signature) -> ProtocolResult<Self> {
        Self::new(k, QueryFlags::FUZZY, signature)
    }

    /// Whether this query runs in fuzzy mode.
    pub fn is_fuzzy(&self) -> bool {
        self.flags.is_fuzzy()
    }
}

/// Decode a query frame.
///
/// Checks are applied in wire order: length, then flags, then `k`.
pub fn decode_query(frame: &[u8]) -> ProtocolResult<Query> {
    if frame.len() != QUERY_FRAME_LEN {
        return Err(ProtocolError::InvalidLength {
            expected: QUERY_FRAME_LEN,
            actual: frame.len(),
        });
    }

    let k = u16::from_le_bytes([frame[0], frame[1]]);
    let flags = QueryFlags::from_bits(u16::from_le_bytes([frame[2], frame[3]]))?;
    if k == 0 {
        return Err(ProtocolError::ZeroK);
    }

    let signature = Signature::from_le_bytes(&frame[QUERY_HEADER_LEN..]).map_err(|_| {
        ProtocolError::InvalidLength {
            expected: QUERY_FRAME_LEN,
            actual: frame.len(),
        }
    })?;

    Ok(Query {
        k,
        flags,
        signature,
    })
}

/// Encode a query frame.
pub fn encode_query(query: &Query) -> Bytes {
    let mut buf = BytesMut::with_capacity(QUERY_FRAME_LEN);
    buf.put_u16_le(query.k);
    buf.put_u16_le(query.flags.bits());
    for word in query.signature.words() {
        buf.put_u64_le(*word);
    }
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;
    use strobe_signature::SignatureBuilder;

    fn sample_query(k: u16, flags: QueryFlags) -> Query {
        let signature = SignatureBuilder::default().build("tok47591");
        Query::new(k, flags, signature).unwrap()
    }

    #[test]
    fn test_frame_len() {
        assert_eq!(QUERY_FRAME_LEN, 516);
    }

    #[test]
    fn test_roundtrip() {
        let query = sample_query(10, QueryFlags::FUZZY);
        let frame = encode_query(&query);
        assert_eq!(frame.len(), QUERY_FRAME_LEN);
        assert_eq!(decode_query(&frame).unwrap(), query);
    }

    #[test]
    fn test_layout_is_little_endian() {
        let mut signature = Signature::zero();
        signature.set_bit(64); // word 1, bit 0
        let query = Query::new(0x0102, QueryFlags::FUZZY, signature).unwrap();
        let frame = encode_query(&query);
        assert_eq!(&frame[0..4], &[0x02, 0x01, 0x01, 0x00]);
        assert_eq!(frame[4 + 8], 0x01);
    }

    #[test]
    fn test_three_byte_body_rejected() {
        assert_eq!(
            decode_query(&[1, 0, 0]).unwrap_err(),
            ProtocolError::InvalidLength {
                expected: QUERY_FRAME_LEN,
                actual: 3
            }
        );
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut frame = encode_query(&sample_query(1, QueryFlags::EXACT)).to_vec();
        frame.push(0);
        assert!(matches!(
            decode_query(&frame),
            Err(ProtocolError::InvalidLength { actual, .. }) if actual == QUERY_FRAME_LEN + 1
        ));
    }

    #[test]
    fn test_reserved_flag_rejected() {
        let mut frame = encode_query(&sample_query(1, QueryFlags::EXACT)).to_vec();
        frame[2] = 0b0000_0100;
        assert_eq!(
            decode_query(&frame).unwrap_err(),
            ProtocolError::ReservedFlags(0b100)
        );
    }

    #[test]
    fn test_zero_k_rejected() {
        let mut frame = encode_query(&sample_query(1, QueryFlags::EXACT)).to_vec();
        frame[0] = 0;
        frame[1] = 0;
        assert_eq!(decode_query(&frame).unwrap_err(), ProtocolError::ZeroK);
        assert_eq!(
            Query::exact(0, Signature::zero()).unwrap_err(),
            ProtocolError::ZeroK
        );
    }
}
