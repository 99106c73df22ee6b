// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// Strobe index - Versioned snapshots
//
// An `IndexSnapshot` is the complete queryable state of a shard at one
// version. It is never mutated: a flush derives the next snapshot from the
// current one, sharing every existing segment through `Arc`, and the shard
// publishes it with a single pointer swap.

use std::sync::Arc;

use strobe_signature::{hamming, Signature};
use strobe_wire::Query;
use tracing::debug;

use crate::segment::Segment;
use crate::topk::{Hit, TopK};

/// Immutable, versioned view of every flushed document.
#[derive(Debug, Clone, Default)]
pub struct IndexSnapshot {
    version: u64,
    segments: Vec<Arc<Segment>>,
    doc_count: usize,
    last_sequence: u64,
}

impl IndexSnapshot {
    /// The empty snapshot at version 0.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Derive version + 1 with `segment` appended.
    ///
    /// `last_sequence` is the highest WAL sequence the new snapshot covers.
    pub fn with_segment(&self, segment: Arc<Segment>, last_sequence: u64) -> Self {
        let mut segments = Vec::with_capacity(self.segments.len() + 1);
        segments.extend(self.segments.iter().cloned());
        let doc_count = self.doc_count + segment.len();
        if !segment.is_empty() {
            segments.push(segment);
        }
        Self {
            version: self.version + 1,
            segments,
            doc_count,
            last_sequence: last_sequence.max(self.last_sequence),
        }
    }

    /// Same documents, same version, held in a single segment.
    pub fn merged(&self) -> Self {
        if self.segments.len() <= 1 {
            return self.clone();
        }
        let merged = Arc::new(Segment::merge(&self.segments));
        debug!(
            version = self.version,
            from = self.segments.len(),
            "Collapsed snapshot segments"
        );
        Self {
            version: self.version,
            segments: vec![merged],
            doc_count: self.doc_count,
            last_sequence: self.last_sequence,
        }
    }

    /// Monotonic snapshot version; 0 is the empty boot state.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Sealed segments, oldest first.
    pub fn segments(&self) -> &[Arc<Segment>] {
        &self.segments
    }

    /// Number of resident (queryable) documents.
    pub fn doc_count(&self) -> usize {
        self.doc_count
    }

    /// Highest WAL sequence materialized into this snapshot.
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    /// Run a decoded query against this snapshot.
    pub fn search(&self, query: &Query) -> Vec<Hit> {
        let k = usize::from(query.k);
        if query.is_fuzzy() {
            self.search_fuzzy(&query.signature, k)
        } else {
            self.search_exact(&query.signature, k)
        }
    }

    /// Documents bitwise identical to `signature`, up to `k`, by ascending doc_id.
    pub fn search_exact(&self, signature: &Signature, k: usize) -> Vec<Hit> {
        let k = k.min(self.doc_count);
        if k == 0 {
            return Vec::new();
        }
        let mut doc_ids: Vec<u64> = self
            .segments
            .iter()
            .flat_map(|segment| segment.exact_matches(signature))
            .collect();
        doc_ids.sort_unstable();
        doc_ids.truncate(k);
        doc_ids.into_iter().map(|doc_id| Hit::new(doc_id, 0)).collect()
    }

    /// The `k` nearest documents by Hamming distance.
    pub fn search_fuzzy(&self, signature: &Signature, k: usize) -> Vec<Hit> {
        let k = k.min(self.doc_count);
        if k == 0 {
            return Vec::new();
        }
        let mut top = TopK::new(k);
        for segment in &self.segments {
            for (doc_id, candidate) in segment.doc_ids().iter().zip(segment.signatures()) {
                let distance = hamming(signature, candidate);
                if distance <= top.threshold() {
                    top.offer(*doc_id, distance);
                }
            }
        }
        top.into_hits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strobe_signature::SignatureBuilder;

    fn sig(text: &str) -> Signature {
        SignatureBuilder::default().build(text)
    }

    fn snapshot_of(batches: &[&[(u64, &str)]]) -> IndexSnapshot {
        let mut snapshot = IndexSnapshot::empty();
        let mut sequence = 0;
        for batch in batches {
            sequence += batch.len() as u64;
            let segment = Segment::build(batch.iter().map(|(id, text)| (*id, sig(text))));
            snapshot = snapshot.with_segment(Arc::new(segment), sequence);
        }
        snapshot
    }

    #[test]
    fn test_exact_self_match() {
        let snapshot = snapshot_of(&[&[(1, "tok47591"), (2, "tok12345")]]);
        let query = Query::exact(1, sig("tok47591")).unwrap();
        let hits = snapshot.search(&query);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].doc_id, 1);
        assert_eq!(hits[0].score, 1.0);
    }

    #[test]
    fn test_exact_orders_by_doc_id_across_segments() {
        let snapshot = snapshot_of(&[&[(9, "dup"), (4, "x")], &[(2, "dup"), (7, "dup")]]);
        let hits = snapshot.search_exact(&sig("dup"), 2);
        let ids: Vec<u64> = hits.iter().map(|h| h.doc_id).collect();
        assert_eq!(ids, vec![2, 7]);
    }

    #[test]
    fn test_fuzzy_ranks_closest_first() {
        let snapshot = snapshot_of(&[&[
            (1, "the quick brown fox"),
            (2, "the quick brown fix"),
            (3, "completely unrelated"),
        ]]);
        let hits = snapshot.search_fuzzy(&sig("the quick brown fox"), 3);
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].doc_id, 1);
        assert_eq!(hits[1].doc_id, 2);
        assert!(hits[0].score > hits[1].score);
        assert!(hits[1].score > hits[2].score);
    }

    #[test]
    fn test_k_clamped_to_resident_count() {
        let snapshot = snapshot_of(&[&[(1, "a"), (2, "b")]]);
        let hits = snapshot.search(&Query::fuzzy(500, sig("a")).unwrap());
        assert_eq!(hits.len(), 2);
        assert!(IndexSnapshot::empty()
            .search(&Query::fuzzy(5, sig("a")).unwrap())
            .is_empty());
    }

    #[test]
    fn test_with_segment_shares_and_versions() {
        let first = snapshot_of(&[&[(1, "a")]]);
        let second = first.with_segment(Arc::new(Segment::build(vec![(2, sig("b"))])), 2);

        assert_eq!(first.version(), 1);
        assert_eq!(second.version(), 2);
        assert_eq!(first.doc_count(), 1);
        assert_eq!(second.doc_count(), 2);
        assert_eq!(second.last_sequence(), 2);
        assert!(Arc::ptr_eq(&first.segments()[0], &second.segments()[0]));
    }

    #[test]
    fn test_merged_keeps_results() {
        let snapshot = snapshot_of(&[&[(1, "alpha")], &[(2, "beta")], &[(3, "gamma")]]);
        let merged = snapshot.merged();
        assert_eq!(merged.segments().len(), 1);
        assert_eq!(merged.version(), snapshot.version());
        let query = sig("beta");
        assert_eq!(
            merged.search_fuzzy(&query, 3),
            snapshot.search_fuzzy(&query, 3)
        );
    }

    #[test]
    fn test_empty_segment_not_retained() {
        let snapshot = IndexSnapshot::empty().with_segment(Arc::new(Segment::default()), 4);
        assert_eq!(snapshot.version(), 1);
        assert!(snapshot.segments().is_empty());
        assert_eq!(snapshot.last_sequence(), 4);
    }
}
