// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// Strobe wire protocol
//
// Fixed binary frames exchanged on the `/search` endpoint. Decoding is pure:
// it never touches shard state and either yields a validated `Query` or a
// `ProtocolError` that the caller maps to a rejected request.
//
// ## Query frame (all integers little-endian)
//
// ```text
// offset 0  u16 k                  -- result count, must be >= 1
// offset 2  u16 flags              -- bit 0 = FUZZY, all other bits reserved (0)
// offset 4  W/64 x u64 signature   -- word i carries bits [64i, 64i+63]
// ```
//
// Total length is exactly `QUERY_FRAME_LEN` (4 + W/8) bytes.
//
// ## Hit frame
//
// ```text
// [u32 count] then count x ([u64 doc_id][f32 score])
// ```
//
// Hits are written best-first.

pub mod error;
pub mod flags;
pub mod hits;
pub mod query;

pub use error::{ProtocolError, ProtocolResult};
pub use flags::QueryFlags;
pub use hits::{decode_hits, encode_hits, WireHit, HIT_ENTRY_LEN, HIT_HEADER_LEN};
pub use query::{decode_query, encode_query, Query, QUERY_FRAME_LEN, QUERY_HEADER_LEN};
