// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
// Fuzz target for query frame decoding

#![no_main]

use libfuzzer_sys::fuzz_target;
use strobe_wire::{decode_query, encode_query, QUERY_FRAME_LEN};

fuzz_target!(|data: &[u8]| {
    // Accepted frames have the one valid length and re-encode to the same
    // bytes.
    if let Ok(query) = decode_query(data) {
        assert_eq!(data.len(), QUERY_FRAME_LEN);
        assert!(query.k >= 1);
        assert_eq!(&encode_query(&query)[..], data);
    }
});
