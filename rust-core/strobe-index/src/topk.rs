// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// Strobe index - Bounded top-k collector
//
// Keeps the k best candidates seen so far in a max-heap keyed on
// (distance, doc_id). The root is the worst retained candidate, so a new
// candidate is admitted only if it beats the root. Lower distance means
// higher similarity; equal distances rank by ascending doc_id.

use std::collections::BinaryHeap;

use serde::Serialize;
use strobe_signature::similarity_from_distance;
use strobe_wire::WireHit;

/// A ranked search result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Hit {
    /// Matching document.
    pub doc_id: u64,
    /// Hamming distance to the query signature.
    pub distance: u32,
    /// `1 - distance / W`.
    pub score: f32,
}

impl Hit {
    /// Build a hit from a distance.
    pub fn new(doc_id: u64, distance: u32) -> Self {
        Self {
            doc_id,
            distance,
            score: similarity_from_distance(distance),
        }
    }

    /// The on-the-wire form of this hit.
    pub fn to_wire(self) -> WireHit {
        WireHit {
            doc_id: self.doc_id,
            score: self.score,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Candidate {
    distance: u32,
    doc_id: u64,
}

/// Fixed-capacity collector for the k nearest signatures.
#[derive(Debug)]
pub struct TopK {
    capacity: usize,
    heap: BinaryHeap<Candidate>,
}

impl TopK {
    /// Create a collector retaining at most `capacity` candidates.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            heap: BinaryHeap::with_capacity(capacity + 1),
        }
    }

    /// Distance a candidate must not exceed to have a chance of admission.
    /// `u32::MAX` while the collector is not yet full.
    #[inline]
    pub fn threshold(&self) -> u32 {
        if self.heap.len() < self.capacity {
            u32::MAX
        } else {
            self.heap.peek().map_or(u32::MAX, |worst| worst.distance)
        }
    }

    /// Offer a candidate.
    #[inline]
    pub fn offer(&mut self, doc_id: u64, distance: u32) {
        if self.capacity == 0 {
            return;
        }
        let candidate = Candidate { distance, doc_id };
        if self.heap.len() < self.capacity {
            self.heap.push(candidate);
        } else if let Some(mut worst) = self.heap.peek_mut() {
            if candidate < *worst {
                *worst = candidate;
            }
        }
    }

    /// Retained candidates, best first.
    pub fn into_hits(self) -> Vec<Hit> {
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|c| Hit::new(c.doc_id, c.distance))
            .collect()
    }
}
