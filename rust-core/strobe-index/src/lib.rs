// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// Strobe index crate
//
// Resident signatures of one shard, organized as immutable segments inside
// a versioned `IndexSnapshot`. Two query modes:
//
// - exact: fingerprint lookup, up to k identical signatures by ascending doc_id
// - fuzzy: full scan with a bounded top-k heap over Hamming distance
//
// Snapshots are plain values. Publishing and swapping them is the shard's job.

pub mod segment;
pub mod snapshot;
pub mod topk;

pub use segment::Segment;
pub use snapshot::IndexSnapshot;
pub use topk::{Hit, TopK};
