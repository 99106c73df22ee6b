// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// Strobe index - Sealed segments
//
// A segment is one flushed batch of documents. Rows are stored column-wise
// (`doc_ids[i]` belongs to `signatures[i]`) so the fuzzy scan walks a
// contiguous slice of signatures. Exact lookups go through a fingerprint
// table and are confirmed against the stored signature.

use std::collections::HashMap;
use std::sync::Arc;

use smallvec::SmallVec;
use strobe_signature::Signature;
use tracing::debug;

/// Rows sharing one fingerprint. Almost always a single row.
type Postings = SmallVec<[u32; 1]>;

/// An immutable batch of indexed documents.
#[derive(Debug, Default)]
pub struct Segment {
    doc_ids: Vec<u64>,
    signatures: Vec<Signature>,
    exact: HashMap<u64, Postings>,
}

impl Segment {
    /// Seal a batch of documents into a segment. Row order follows input order.
    pub fn build<I>(documents: I) -> Self
    where
        I: IntoIterator<Item = (u64, Signature)>,
    {
        let documents = documents.into_iter();
        let (lower, _) = documents.size_hint();
        let mut segment = Segment {
            doc_ids: Vec::with_capacity(lower),
            signatures: Vec::with_capacity(lower),
            exact: HashMap::with_capacity(lower),
        };
        for (doc_id, signature) in documents {
            segment.push(doc_id, signature);
        }
        segment
    }

    /// Merge several segments into one, preserving row order.
    pub fn merge(segments: &[Arc<Segment>]) -> Self {
        let total = segments.iter().map(|s| s.len()).sum();
        let mut merged = Segment {
            doc_ids: Vec::with_capacity(total),
            signatures: Vec::with_capacity(total),
            exact: HashMap::with_capacity(total),
        };
        for segment in segments {
            for (doc_id, signature) in segment.iter() {
                merged.push(doc_id, signature.clone());
            }
        }
        debug!(inputs = segments.len(), rows = total, "Merged index segments");
        merged
    }

    fn push(&mut self, doc_id: u64, signature: Signature) {
        let row = self.doc_ids.len() as u32;
        self.exact
            .entry(signature.fingerprint())
            .or_default()
            .push(row);
        self.doc_ids.push(doc_id);
        self.signatures.push(signature);
    }

    /// Number of documents in the segment.
    pub fn len(&self) -> usize {
        self.doc_ids.len()
    }

    /// Whether the segment holds no documents.
    pub fn is_empty(&self) -> bool {
        self.doc_ids.is_empty()
    }

    /// Document ids, row-aligned with [`Segment::signatures`].
    pub fn doc_ids(&self) -> &[u64] {
        &self.doc_ids
    }

    /// Signatures, row-aligned with [`Segment::doc_ids`].
    pub fn signatures(&self) -> &[Signature] {
        &self.signatures
    }

    /// Iterate `(doc_id, signature)` rows.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &Signature)> {
        self.doc_ids.iter().copied().zip(self.signatures.iter())
    }

    /// Documents whose signature equals `signature` bit for bit.
    pub fn exact_matches<'a>(&'a self, signature: &'a Signature) -> impl Iterator<Item = u64> + 'a {
        self.exact
            .get(&signature.fingerprint())
            .into_iter()
            .flat_map(|rows| rows.iter())
            .filter(move |row| &self.signatures[**row as usize] == signature)
            .map(move |row| self.doc_ids[*row as usize])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strobe_signature::SignatureBuilder;

    fn sig(text: &str) -> Signature {
        SignatureBuilder::default().build(text)
    }

    #[test]
    fn test_build_keeps_rows_aligned() {
        let segment = Segment::build(vec![(5, sig("five")), (3, sig("three"))]);
        assert_eq!(segment.len(), 2);
        assert_eq!(segment.doc_ids(), &[5, 3]);
        assert_eq!(segment.signatures()[1], sig("three"));
    }

    #[test]
    fn test_exact_matches_all_identical_rows() {
        let segment = Segment::build(vec![
            (1, sig("same")),
            (2, sig("other")),
            (3, sig("same")),
        ]);
        let query = sig("same");
        let mut found: Vec<u64> = segment.exact_matches(&query).collect();
        found.sort_unstable();
        assert_eq!(found, vec![1, 3]);
        assert_eq!(segment.exact_matches(&sig("missing")).count(), 0);
    }

    #[test]
    fn test_merge_preserves_everything() {
        let a = Arc::new(Segment::build(vec![(1, sig("a")), (2, sig("b"))]));
        let b = Arc::new(Segment::build(vec![(3, sig("c"))]));
        let merged = Segment::merge(&[a, b]);
        assert_eq!(merged.doc_ids(), &[1, 2, 3]);
        assert_eq!(merged.exact_matches(&sig("c")).collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn test_empty_segment() {
        let segment = Segment::build(std::iter::empty());
        assert!(segment.is_empty());
        assert_eq!(segment.exact_matches(&Signature::zero()).count(), 0);
    }
}
