// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
// Fuzz target for WAL record parsing

#![no_main]

use libfuzzer_sys::fuzz_target;
use strobe_wal::WalRecord;

fuzz_target!(|data: &[u8]| {
    // Treat the input like bytes read from a segment: a length prefix
    // followed by the record. Parsing may fail but must not panic.
    if data.len() < 4 {
        return;
    }
    let record_length = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    if let Ok(record) = WalRecord::deserialize(&data[4..], record_length) {
        // Anything accepted re-serializes with a valid checksum.
        let bytes = record.serialize();
        let length = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let again = WalRecord::deserialize(&bytes[4..], length);
        assert!(again.is_ok());
    }
});
