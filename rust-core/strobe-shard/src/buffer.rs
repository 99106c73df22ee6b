// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// Strobe shard - Flush buffer
//
// Documents that are in the WAL but not yet in any published snapshot.

use std::time::Instant;

use strobe_signature::Signature;

/// Documents taken out of the buffer for one flush.
#[derive(Debug, Default)]
pub struct FlushBatch {
    /// Documents in WAL order.
    pub documents: Vec<(u64, Signature)>,
    /// WAL sequence of the last document in the batch.
    pub last_sequence: u64,
}

impl FlushBatch {
    /// Number of documents in the batch.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Whether the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Logged, not yet indexed documents.
#[derive(Debug, Default)]
pub struct FlushBuffer {
    documents: Vec<(u64, Signature)>,
    last_sequence: u64,
    oldest: Option<Instant>,
}

impl FlushBuffer {
    /// An empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a document that was appended to the WAL at `sequence`.
    pub fn push(&mut self, doc_id: u64, signature: Signature, sequence: u64) {
        if self.documents.is_empty() {
            self.oldest = Some(Instant::now());
        }
        self.documents.push((doc_id, signature));
        self.last_sequence = sequence;
    }

    /// Buffered document count.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Whether nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// When the oldest buffered document arrived.
    pub fn oldest(&self) -> Option<Instant> {
        self.oldest
    }

    /// Take everything, leaving the buffer empty.
    pub fn take(&mut self) -> FlushBatch {
        self.oldest = None;
        FlushBatch {
            documents: std::mem::take(&mut self.documents),
            last_sequence: self.last_sequence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_take() {
        let mut buffer = FlushBuffer::new();
        assert!(buffer.oldest().is_none());

        buffer.push(1, Signature::zero(), 10);
        buffer.push(2, Signature::zero(), 11);
        assert_eq!(buffer.len(), 2);
        assert!(buffer.oldest().is_some());

        let batch = buffer.take();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.last_sequence, 11);
        assert_eq!(batch.documents[0].0, 1);
        assert!(buffer.is_empty());
        assert!(buffer.oldest().is_none());
    }

    #[test]
    fn test_oldest_is_first_arrival() {
        let mut buffer = FlushBuffer::new();
        buffer.push(1, Signature::zero(), 1);
        let first = buffer.oldest();
        std::thread::sleep(std::time::Duration::from_millis(2));
        buffer.push(2, Signature::zero(), 2);
        assert_eq!(buffer.oldest(), first);
    }
}
