// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//! Property-based tests for top-k matching

use std::sync::Arc;

use proptest::prelude::*;
use strobe_index::{IndexSnapshot, Segment};
use strobe_signature::{hamming, Signature, SIGNATURE_WORDS};

/// Sparse signatures so distances collide often and tie-breaks matter.
fn arb_signature() -> impl Strategy<Value = Signature> {
    prop::collection::vec(prop::sample::select(vec![0u64, 1, 3, 0xff, u64::MAX]), SIGNATURE_WORDS)
        .prop_map(|words| Signature::try_from_words(&words).unwrap())
}

fn arb_snapshot() -> impl Strategy<Value = (IndexSnapshot, Vec<(u64, Signature)>)> {
    prop::collection::vec(
        prop::collection::vec(arb_signature(), 0..12),
        1..4,
    )
    .prop_map(|batches| {
        let mut snapshot = IndexSnapshot::empty();
        let mut all = Vec::new();
        let mut next_id = 0u64;
        for batch in batches {
            let rows: Vec<(u64, Signature)> = batch
                .into_iter()
                .map(|sig| {
                    // Scatter ids so row order differs from id order.
                    next_id += 1;
                    (next_id.wrapping_mul(7919) % 1009, sig)
                })
                .collect();
            all.extend(rows.iter().cloned());
            snapshot = snapshot.with_segment(Arc::new(Segment::build(rows)), next_id);
        }
        (snapshot, all)
    })
}

proptest! {
    #[test]
    fn test_fuzzy_matches_brute_force((snapshot, docs) in arb_snapshot(), query in arb_signature(), k in 1usize..20) {
        let mut expected: Vec<(u32, u64)> = docs
            .iter()
            .map(|(id, sig)| (hamming(&query, sig), *id))
            .collect();
        expected.sort_unstable();
        expected.truncate(k);

        let hits = snapshot.search_fuzzy(&query, k);
        let actual: Vec<(u32, u64)> = hits.iter().map(|h| (h.distance, h.doc_id)).collect();
        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn test_result_count_never_exceeds_k((snapshot, _docs) in arb_snapshot(), query in arb_signature(), k in 1usize..20) {
        prop_assert!(snapshot.search_fuzzy(&query, k).len() <= k);
        prop_assert!(snapshot.search_exact(&query, k).len() <= k);
    }

    #[test]
    fn test_exact_returns_only_identical((snapshot, docs) in arb_snapshot(), pick in any::<prop::sample::Index>()) {
        prop_assume!(!docs.is_empty());
        let (_, target) = &docs[pick.index(docs.len())];

        let mut expected: Vec<u64> = docs
            .iter()
            .filter(|(_, sig)| sig == target)
            .map(|(id, _)| *id)
            .collect();
        expected.sort_unstable();

        let hits = snapshot.search_exact(target, docs.len());
        let actual: Vec<u64> = hits.iter().map(|h| h.doc_id).collect();
        prop_assert_eq!(actual, expected);
    }
}
