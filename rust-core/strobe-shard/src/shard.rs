// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// Strobe shard - Shard owner
//
// A `Shard` owns one WAL and one snapshot lineage.
//
// Write path: validate, then under the write lock append to the WAL and
// push into the flush buffer. Any fsync the sync policy owes is completed
// after the lock is released.
//
// Read path: load the current snapshot pointer and scan it. Readers never
// take a lock.
//
// Flush: take the buffer and append a checkpoint under the write lock,
// complete the checkpoint sync outside it, build a segment, then publish the
// next snapshot with one pointer swap.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use serde::Serialize;
use strobe_index::{Hit, IndexSnapshot, Segment};
use strobe_signature::{Signature, SignatureBuilder};
use strobe_wal::{PendingSync, RecordBody, WalReader, WalWriter};
use strobe_wire::Query;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::buffer::FlushBuffer;
use crate::config::ShardConfig;
use crate::error::{ShardError, ShardResult};
use crate::health::{HealthCell, HealthReport, ShardHealth};

/// State guarded by the single-writer lock.
struct WriteState {
    wal: WalWriter,
    buffer: FlushBuffer,
    /// Every doc_id ever accepted, resident or buffered.
    known: HashSet<u64>,
}

/// Result of an accepted ingest call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestReceipt {
    /// Documents accepted.
    pub accepted: usize,
    /// WAL sequence of the first accepted document (0 if none).
    pub first_sequence: u64,
    /// WAL sequence of the last accepted document (0 if none).
    pub last_sequence: u64,
}

/// Result of a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FlushOutcome {
    /// Version of the snapshot now published.
    pub version: u64,
    /// Documents that became visible.
    pub documents: usize,
    /// Segments in the published snapshot.
    pub segments: usize,
    /// Sequence of the checkpoint record, if one was written.
    pub checkpoint_sequence: Option<u64>,
}

/// Counters describing a shard.
#[derive(Debug, Clone, Serialize)]
pub struct ShardStats {
    /// This shard.
    pub shard_id: u32,
    /// Total shards in the deployment.
    pub shard_count: u32,
    /// Current health state.
    pub health: ShardHealth,
    /// Published snapshot version.
    pub snapshot_version: u64,
    /// Queryable documents.
    pub resident_docs: usize,
    /// Segments in the published snapshot.
    pub segments: usize,
    /// Documents logged but not yet visible.
    pub buffered_docs: usize,
    /// Highest WAL sequence written.
    pub last_sequence: u64,
    /// Highest WAL sequence known to be on stable storage.
    pub durable_sequence: u64,
    /// Highest WAL sequence visible to queries.
    pub indexed_sequence: u64,
    /// Configured WAL sync policy.
    pub sync_policy: String,
}

/// One shard of the document space.
pub struct Shard {
    config: ShardConfig,
    builder: SignatureBuilder,
    health: HealthCell,
    snapshot: ArcSwap<IndexSnapshot>,
    write: Mutex<WriteState>,
    /// Serializes flushes so snapshots are published in order.
    flush_lock: Mutex<()>,
    flush_signal: Notify,
}

impl Shard {
    /// Recover the shard's WAL, rebuild its index and start serving.
    pub fn open(config: ShardConfig) -> ShardResult<Self> {
        config.validate()?;
        let health = HealthCell::new();

        let wal_dir = config.wal_dir();
        std::fs::create_dir_all(&wal_dir)?;

        let started = Instant::now();
        let recovery = WalReader::open(&wal_dir)
            .and_then(|reader| reader.recover())
            .map_err(ShardError::Recovery)?;
        if let Some(truncation) = &recovery.truncation {
            warn!(
                segment = %truncation.segment.display(),
                offset = truncation.offset,
                discarded_bytes = truncation.discarded_bytes,
                preserved = ?truncation.preserved,
                reason = %truncation.reason,
                quarantined = recovery.quarantined.len(),
                "WAL repaired during boot"
            );
        }

        let mut snapshot = IndexSnapshot::empty();
        let mut known = HashSet::with_capacity(recovery.records.len());
        let mut chunk: Vec<(u64, Signature)> = Vec::new();
        let mut duplicates = 0usize;
        let mut foreign = 0usize;
        let mut last_document_sequence = 0u64;

        for record in recovery.records {
            let RecordBody::Document { doc_id, signature } = record.body else {
                continue;
            };
            if !known.insert(doc_id) {
                duplicates += 1;
                continue;
            }
            if !config.owns(doc_id) {
                foreign += 1;
            }
            chunk.push((doc_id, signature));
            last_document_sequence = record.sequence;
            if chunk.len() >= config.replay_segment_docs {
                let segment = Segment::build(std::mem::take(&mut chunk));
                snapshot = snapshot.with_segment(Arc::new(segment), record.sequence);
            }
        }
        if !chunk.is_empty() {
            snapshot = snapshot.with_segment(Arc::new(Segment::build(chunk)), last_document_sequence);
        }
        if duplicates > 0 {
            warn!(duplicates, "Skipped repeated doc_ids during replay");
        }
        if foreign > 0 {
            warn!(
                foreign,
                shard_id = config.shard_id,
                shard_count = config.shard_count,
                "Replayed documents owned by other shards"
            );
        }

        let wal = WalWriter::open_with_max_size(
            &wal_dir,
            config.sync_policy,
            config.max_wal_segment_bytes,
        )
        .map_err(ShardError::Recovery)?;

        info!(
            shard_id = config.shard_id,
            docs = snapshot.doc_count(),
            segments = snapshot.segments().len(),
            last_sequence = wal.last_sequence(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Shard replay complete"
        );

        let shard = Self {
            builder: SignatureBuilder::new(config.hashes_per_shingle),
            health,
            snapshot: ArcSwap::from_pointee(snapshot),
            write: Mutex::new(WriteState {
                wal,
                buffer: FlushBuffer::new(),
                known,
            }),
            flush_lock: Mutex::new(()),
            flush_signal: Notify::new(),
            config,
        };
        shard.health.mark_serving();
        Ok(shard)
    }

    /// Shard configuration.
    pub fn config(&self) -> &ShardConfig {
        &self.config
    }

    /// Current health state.
    pub fn health(&self) -> ShardHealth {
        self.health.get()
    }

    /// Health state with transition details.
    pub fn health_report(&self) -> HealthReport {
        self.health.report()
    }

    /// Build the signature of `text` with this shard's builder.
    pub fn signature_of(&self, text: &str) -> Signature {
        self.builder.build(text)
    }

    /// The currently published snapshot.
    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        self.snapshot.load_full()
    }

    // -----------------------------------------------------------------------
    // Ingest
    // -----------------------------------------------------------------------

    /// Ingest one document.
    pub fn ingest(&self, doc_id: u64, signature: Signature) -> ShardResult<u64> {
        self.ingest_batch(vec![(doc_id, signature)])
            .map(|receipt| receipt.last_sequence)
    }

    /// Ingest one document from raw text.
    pub fn ingest_text(&self, doc_id: u64, text: &str) -> ShardResult<u64> {
        self.ingest(doc_id, self.signature_of(text))
    }

    /// Ingest a batch of documents.
    ///
    /// Ownership, duplicate and capacity checks cover the whole batch before
    /// anything is logged, so a batch rejected by validation leaves no trace.
    /// The batch shares one sync.
    ///
    /// A WAL write error part way through degrades the shard. Documents
    /// appended before the error stay in the log and buffer and come back on
    /// replay even though the caller sees the error.
    pub fn ingest_batch(&self, documents: Vec<(u64, Signature)>) -> ShardResult<IngestReceipt> {
        let state = self.health.get();
        if !state.is_writable() {
            return Err(ShardError::NotWritable(state));
        }
        if let Some((doc_id, _)) = documents.iter().find(|(id, _)| !self.config.owns(*id)) {
            return Err(ShardError::WrongShard {
                doc_id: *doc_id,
                owner: self.config.owner_of(*doc_id),
                shard_id: self.config.shard_id,
            });
        }

        let (receipt, pending, wake) = {
            let mut guard = self.write.lock();
            let write = &mut *guard;

            let buffered = write.buffer.len();
            if buffered + documents.len() > self.config.max_buffered_docs {
                return Err(ShardError::Overloaded {
                    buffered,
                    limit: self.config.max_buffered_docs,
                });
            }
            let mut batch_ids = HashSet::with_capacity(documents.len());
            for (doc_id, _) in &documents {
                if write.known.contains(doc_id) || !batch_ids.insert(*doc_id) {
                    return Err(ShardError::DuplicateDocument(*doc_id));
                }
            }

            let mut receipt = IngestReceipt {
                accepted: 0,
                first_sequence: 0,
                last_sequence: 0,
            };
            let mut pending: Option<PendingSync> = None;
            for (doc_id, signature) in documents {
                let appended = match write.wal.append_document(doc_id, signature.clone()) {
                    Ok(appended) => appended,
                    Err(err) => {
                        self.health.degrade(err.to_string());
                        return Err(err.into());
                    }
                };
                if receipt.accepted == 0 {
                    receipt.first_sequence = appended.sequence;
                }
                receipt.accepted += 1;
                receipt.last_sequence = appended.sequence;
                // A later sync covers everything before it: rotation syncs
                // the outgoing segment.
                if appended.pending_sync.is_some() {
                    pending = appended.pending_sync;
                }
                write.known.insert(doc_id);
                write.buffer.push(doc_id, signature, appended.sequence);
            }

            let len = write.buffer.len();
            let wake = receipt.accepted > 0 && (buffered == 0 || len >= self.config.flush_docs);
            (receipt, pending, wake)
        };

        if let Some(pending) = pending {
            if let Err(err) = pending.complete() {
                self.health.degrade(err.to_string());
                return Err(err.into());
            }
        }
        if wake {
            self.flush_signal.notify_one();
        }

        debug!(
            accepted = receipt.accepted,
            last_sequence = receipt.last_sequence,
            "Ingested documents"
        );
        Ok(receipt)
    }

    // -----------------------------------------------------------------------
    // Search
    // -----------------------------------------------------------------------

    /// Run a query against the current snapshot.
    pub fn search(&self, query: &Query) -> ShardResult<Vec<Hit>> {
        let state = self.health.get();
        if !state.is_readable() {
            return Err(ShardError::NotReadable(state));
        }
        Ok(self.snapshot.load().search(query))
    }

    // -----------------------------------------------------------------------
    // Flush
    // -----------------------------------------------------------------------

    /// Materialize every buffered document into a new snapshot.
    ///
    /// A failed checkpoint degrades the shard; the previous snapshot stays
    /// published.
    pub fn flush_now(&self) -> ShardResult<FlushOutcome> {
        let _flushing = self.flush_lock.lock();
        let state = self.health.get();
        if !state.is_writable() {
            return Err(ShardError::NotWritable(state));
        }

        let (batch, checkpoint_sequence, pending) = {
            let mut write = self.write.lock();
            if write.buffer.is_empty() {
                let current = self.snapshot.load();
                return Ok(FlushOutcome {
                    version: current.version(),
                    documents: 0,
                    segments: current.segments().len(),
                    checkpoint_sequence: None,
                });
            }
            let batch = write.buffer.take();
            match write.wal.begin_checkpoint() {
                Ok((sequence, pending)) => (batch, sequence, pending),
                Err(err) => {
                    self.health.degrade(err.to_string());
                    return Err(err.into());
                }
            }
        };

        if let Err(err) = pending.complete() {
            self.health.degrade(err.to_string());
            return Err(err.into());
        }

        let documents = batch.len();
        let last_sequence = batch.last_sequence;
        let segment = Arc::new(Segment::build(batch.documents));

        let current = self.snapshot.load_full();
        let mut next = current.with_segment(segment, last_sequence);
        if next.segments().len() > self.config.max_segments {
            next = next.merged();
        }
        let outcome = FlushOutcome {
            version: next.version(),
            documents,
            segments: next.segments().len(),
            checkpoint_sequence: Some(checkpoint_sequence),
        };
        self.snapshot.store(Arc::new(next));

        debug!(
            version = outcome.version,
            documents,
            checkpoint_sequence,
            "Published snapshot"
        );
        Ok(outcome)
    }

    /// When the scheduler should next flush, if anything is buffered.
    pub fn next_flush_deadline(&self) -> Option<Instant> {
        let write = self.write.lock();
        if write.buffer.len() >= self.config.flush_docs {
            return Some(Instant::now());
        }
        write
            .buffer
            .oldest()
            .map(|oldest| oldest + self.config.flush_interval())
    }

    pub(crate) fn flush_signal(&self) -> &Notify {
        &self.flush_signal
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Flush what is buffered, sync the WAL and move to `Stopped`.
    pub fn shutdown(&self) -> ShardResult<()> {
        let flushed = if self.health.get().is_writable() {
            self.flush_now().map(|_| ())
        } else {
            Ok(())
        };
        if let Err(err) = self.write.lock().wal.sync() {
            warn!(error = %err, "Final WAL sync failed");
        }
        self.health.stop();
        self.flush_signal.notify_one();
        flushed
    }

    /// Snapshot of shard counters.
    pub fn stats(&self) -> ShardStats {
        let snapshot = self.snapshot.load();
        let (buffered_docs, last_sequence, durable_sequence) = {
            let write = self.write.lock();
            (
                write.buffer.len(),
                write.wal.last_sequence(),
                write.wal.durable().sequence,
            )
        };
        ShardStats {
            shard_id: self.config.shard_id,
            shard_count: self.config.shard_count,
            health: self.health.get(),
            snapshot_version: snapshot.version(),
            resident_docs: snapshot.doc_count(),
            segments: snapshot.segments().len(),
            buffered_docs,
            last_sequence,
            durable_sequence,
            indexed_sequence: snapshot.last_sequence(),
            sync_policy: self.config.sync_policy.to_string(),
        }
    }
}

impl std::fmt::Debug for Shard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shard")
            .field("shard_id", &self.config.shard_id)
            .field("health", &self.health.get())
            .field("version", &self.snapshot.load().version())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strobe_wal::SyncPolicy;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> ShardConfig {
        let mut config = ShardConfig::new(dir.path());
        config.sync_policy = SyncPolicy::Always;
        config
    }

    #[test]
    fn test_open_empty_is_serving() {
        let dir = TempDir::new().unwrap();
        let shard = Shard::open(config(&dir)).unwrap();
        assert_eq!(shard.health(), ShardHealth::Serving);
        assert_eq!(shard.snapshot().doc_count(), 0);
        assert!(shard.config().wal_dir().is_dir());
    }

    #[test]
    fn test_ingest_is_invisible_until_flush() {
        let dir = TempDir::new().unwrap();
        let shard = Shard::open(config(&dir)).unwrap();

        let signature = shard.signature_of("tok47591");
        shard.ingest(1, signature.clone()).unwrap();
        let query = Query::exact(1, signature).unwrap();
        assert!(shard.search(&query).unwrap().is_empty());
        assert_eq!(shard.stats().buffered_docs, 1);

        let outcome = shard.flush_now().unwrap();
        assert_eq!(outcome.documents, 1);
        let hits = shard.search(&query).unwrap();
        assert_eq!(hits.iter().map(|h| h.doc_id).collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_empty_flush_keeps_version() {
        let dir = TempDir::new().unwrap();
        let shard = Shard::open(config(&dir)).unwrap();
        let before = shard.snapshot().version();
        let outcome = shard.flush_now().unwrap();
        assert_eq!(outcome.version, before);
        assert_eq!(outcome.checkpoint_sequence, None);
    }

    #[test]
    fn test_duplicate_doc_rejected() {
        let dir = TempDir::new().unwrap();
        let shard = Shard::open(config(&dir)).unwrap();
        shard.ingest_text(5, "five").unwrap();
        assert!(matches!(
            shard.ingest_text(5, "again"),
            Err(ShardError::DuplicateDocument(5))
        ));
        shard.flush_now().unwrap();
        assert!(matches!(
            shard.ingest_text(5, "after flush"),
            Err(ShardError::DuplicateDocument(5))
        ));
    }

    #[test]
    fn test_duplicate_within_batch_rejects_whole_batch() {
        let dir = TempDir::new().unwrap();
        let shard = Shard::open(config(&dir)).unwrap();
        let sig = shard.signature_of("x");
        let result = shard.ingest_batch(vec![(1, sig.clone()), (2, sig.clone()), (1, sig)]);
        assert!(matches!(result, Err(ShardError::DuplicateDocument(1))));
        assert_eq!(shard.stats().buffered_docs, 0);
        assert_eq!(shard.stats().last_sequence, 0);
    }

    #[test]
    fn test_wrong_shard_rejected() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(&dir);
        cfg.shard_count = 3;
        cfg.shard_id = 1;
        let shard = Shard::open(cfg).unwrap();

        shard.ingest_text(4, "mine").unwrap();
        match shard.ingest_text(5, "not mine") {
            Err(ShardError::WrongShard { owner, .. }) => assert_eq!(owner, 2),
            other => panic!("expected WrongShard, got {other:?}"),
        }
    }

    #[test]
    fn test_buffer_cap_sheds_ingest() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(&dir);
        cfg.max_buffered_docs = 2;
        let shard = Shard::open(cfg).unwrap();

        shard.ingest_text(1, "a").unwrap();
        shard.ingest_text(2, "b").unwrap();
        let err = shard.ingest_text(3, "c").unwrap_err();
        assert!(err.is_retryable());

        shard.flush_now().unwrap();
        shard.ingest_text(3, "c").unwrap();
    }

    #[test]
    fn test_restart_replays_flushed_and_buffered() {
        let dir = TempDir::new().unwrap();
        {
            let shard = Shard::open(config(&dir)).unwrap();
            shard.ingest_text(1, "flushed one").unwrap();
            shard.ingest_text(2, "flushed two").unwrap();
            shard.flush_now().unwrap();
            shard.ingest_text(3, "only logged").unwrap();
        }

        let shard = Shard::open(config(&dir)).unwrap();
        assert_eq!(shard.snapshot().doc_count(), 3);
        let query = Query::exact(5, shard.signature_of("only logged")).unwrap();
        assert_eq!(shard.search(&query).unwrap()[0].doc_id, 3);
        // Sequences continue: 3 documents plus 1 checkpoint were written.
        assert_eq!(shard.ingest_text(4, "new").unwrap(), 5);
        assert!(matches!(
            shard.ingest_text(2, "dup"),
            Err(ShardError::DuplicateDocument(2))
        ));
    }

    #[test]
    fn test_replay_chunks_into_segments() {
        let dir = TempDir::new().unwrap();
        {
            let shard = Shard::open(config(&dir)).unwrap();
            for id in 0..10 {
                shard.ingest_text(id, &format!("doc {id}")).unwrap();
            }
        }
        let mut cfg = config(&dir);
        cfg.replay_segment_docs = 4;
        let shard = Shard::open(cfg).unwrap();
        assert_eq!(shard.snapshot().segments().len(), 3);
        assert_eq!(shard.snapshot().last_sequence(), 10);
    }

    #[test]
    fn test_segments_merge_past_limit() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(&dir);
        cfg.max_segments = 2;
        let shard = Shard::open(cfg).unwrap();
        for id in 0..3 {
            shard.ingest_text(id, &format!("batch {id}")).unwrap();
            shard.flush_now().unwrap();
        }
        let snapshot = shard.snapshot();
        assert_eq!(snapshot.segments().len(), 1);
        assert_eq!(snapshot.doc_count(), 3);
    }

    #[test]
    fn test_durability_failure_degrades_but_keeps_reads() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(&dir);
        // Every record lands in a fresh segment, so each append needs a
        // new file in the WAL directory.
        cfg.max_wal_segment_bytes = strobe_wal::DOCUMENT_RECORD_SIZE as u64;
        let wal_dir = cfg.wal_dir();
        let shard = Shard::open(cfg).unwrap();

        let signature = shard.signature_of("survivor");
        shard.ingest(1, signature.clone()).unwrap();
        shard.flush_now().unwrap();

        std::fs::remove_dir_all(&wal_dir).unwrap();
        let err = shard.ingest_text(2, "doomed").unwrap_err();
        assert!(matches!(err, ShardError::Durability(_)));
        assert_eq!(shard.health(), ShardHealth::Degraded);
        assert!(shard.health_report().reason.is_some());

        assert!(matches!(
            shard.ingest_text(3, "refused"),
            Err(ShardError::NotWritable(ShardHealth::Degraded))
        ));
        let hits = shard.search(&Query::exact(1, signature).unwrap()).unwrap();
        assert_eq!(hits[0].doc_id, 1);
    }

    #[test]
    fn test_shutdown_flushes_and_stops() {
        let dir = TempDir::new().unwrap();
        let shard = Shard::open(config(&dir)).unwrap();
        shard.ingest_text(1, "last words").unwrap();
        shard.shutdown().unwrap();

        assert_eq!(shard.health(), ShardHealth::Stopped);
        assert_eq!(shard.snapshot().doc_count(), 1);
        let query = Query::exact(1, shard.signature_of("last words")).unwrap();
        assert!(matches!(
            shard.search(&query),
            Err(ShardError::NotReadable(ShardHealth::Stopped))
        ));
    }

    #[test]
    fn test_flush_deadline() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(&dir);
        cfg.flush_docs = 2;
        cfg.flush_interval_ms = 60_000;
        let shard = Shard::open(cfg).unwrap();

        assert!(shard.next_flush_deadline().is_none());
        shard.ingest_text(1, "a").unwrap();
        let deadline = shard.next_flush_deadline().unwrap();
        assert!(deadline > Instant::now());
        shard.ingest_text(2, "b").unwrap();
        assert!(shard.next_flush_deadline().unwrap() <= Instant::now());
    }

    #[test]
    fn test_stats_track_sequences() {
        let dir = TempDir::new().unwrap();
        let shard = Shard::open(config(&dir)).unwrap();
        shard.ingest_text(1, "a").unwrap();
        shard.ingest_text(2, "b").unwrap();

        let stats = shard.stats();
        assert_eq!(stats.last_sequence, 2);
        assert_eq!(stats.durable_sequence, 2);
        assert_eq!(stats.indexed_sequence, 0);
        assert_eq!(stats.sync_policy, "always");

        shard.flush_now().unwrap();
        let stats = shard.stats();
        assert_eq!(stats.indexed_sequence, 2);
        assert_eq!(stats.durable_sequence, 3);
        assert_eq!(stats.resident_docs, 2);
    }
}
