// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//! Property-based tests for the query frame codec

use proptest::prelude::*;
use strobe_signature::{Signature, SIGNATURE_WORDS};
use strobe_wire::{decode_query, encode_query, ProtocolError, Query, QueryFlags, QUERY_FRAME_LEN};

fn arb_signature() -> impl Strategy<Value = Signature> {
    prop::collection::vec(any::<u64>(), SIGNATURE_WORDS)
        .prop_map(|words| Signature::try_from_words(&words).unwrap())
}

fn arb_flags() -> impl Strategy<Value = QueryFlags> {
    prop_oneof![Just(QueryFlags::EXACT), Just(QueryFlags::FUZZY)]
}

proptest! {
    #[test]
    fn test_decode_inverts_encode(k in 1u16.., flags in arb_flags(), signature in arb_signature()) {
        let query = Query::new(k, flags, signature).unwrap();
        let decoded = decode_query(&encode_query(&query)).unwrap();
        prop_assert_eq!(decoded, query);
    }

    #[test]
    fn test_any_other_length_rejected(body in prop::collection::vec(any::<u8>(), 0..1100)) {
        prop_assume!(body.len() != QUERY_FRAME_LEN);
        let rejected = matches!(
            decode_query(&body),
            Err(ProtocolError::InvalidLength { .. })
        );
        prop_assert!(rejected);
    }

    #[test]
    fn test_reserved_bits_always_rejected(k in 1u16.., reserved in 1u16..=0x7fff, signature in arb_signature()) {
        let mut frame = encode_query(&Query::exact(k, signature).unwrap()).to_vec();
        let bits = reserved << 1;
        frame[2..4].copy_from_slice(&bits.to_le_bytes());
        prop_assert_eq!(decode_query(&frame), Err(ProtocolError::ReservedFlags(bits)));
    }
}
