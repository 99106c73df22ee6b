// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// Strobe shard - Flush scheduler
//
// A tokio task that flushes the shard when the buffer reaches the document
// threshold or the oldest buffered document has waited for the flush
// interval, whichever comes first. Ingest wakes the task through the
// shard's `Notify`; the timer covers the interval. The flush itself builds
// a segment, so it runs on the blocking pool.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::error::ShardError;
use crate::shard::Shard;

/// Re-check interval while nothing is buffered.
const IDLE_WAIT: Duration = Duration::from_secs(1);

/// Handle to a running flush scheduler.
#[derive(Debug)]
pub struct FlushScheduler {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl FlushScheduler {
    /// Start flushing `shard` in the background.
    pub fn spawn(shard: Arc<Shard>) -> Self {
        let (stop, stopped) = watch::channel(false);
        let handle = tokio::spawn(run(shard, stopped));
        Self { stop, handle }
    }

    /// Whether the task has exited (shard stopped or degraded).
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop the task and wait for any in-progress flush to finish.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        if let Err(err) = self.handle.await {
            error!(error = %err, "Flush scheduler task failed");
        }
    }
}

async fn run(shard: Arc<Shard>, mut stopped: watch::Receiver<bool>) {
    info!(
        flush_docs = shard.config().flush_docs,
        flush_interval_ms = shard.config().flush_interval_ms,
        "Flush scheduler started"
    );

    loop {
        if *stopped.borrow() || !shard.health().is_writable() {
            break;
        }

        let due = shard.next_flush_deadline().map(Instant::from_std);
        if let Some(at) = due {
            if at <= Instant::now() {
                if !flush_once(&shard).await {
                    break;
                }
                continue;
            }
        }

        let wake_at = due.unwrap_or_else(|| Instant::now() + IDLE_WAIT);
        tokio::select! {
            changed = stopped.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = shard.flush_signal().notified() => {}
            _ = tokio::time::sleep_until(wake_at) => {}
        }
    }

    info!(health = %shard.health(), "Flush scheduler stopped");
}

/// Run one flush. Returns whether the scheduler should keep going.
async fn flush_once(shard: &Arc<Shard>) -> bool {
    let worker = Arc::clone(shard);
    match tokio::task::spawn_blocking(move || worker.flush_now()).await {
        Ok(Ok(outcome)) => {
            debug!(
                version = outcome.version,
                documents = outcome.documents,
                "Scheduled flush"
            );
            true
        }
        Ok(Err(ShardError::NotWritable(_))) => false,
        Ok(Err(err)) => {
            error!(error = %err, "Scheduled flush failed");
            shard.health().is_writable()
        }
        Err(err) => {
            error!(error = %err, "Flush task panicked");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ShardConfig;
    use strobe_wal::SyncPolicy;
    use tempfile::TempDir;

    async fn wait_for_docs(shard: &Shard, count: usize) -> bool {
        for _ in 0..500 {
            if shard.snapshot().doc_count() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_flushes_on_document_threshold() {
        let dir = TempDir::new().unwrap();
        let mut config = ShardConfig::new(dir.path());
        config.sync_policy = SyncPolicy::Never;
        config.flush_docs = 3;
        config.flush_interval_ms = 600_000;
        let shard = Arc::new(Shard::open(config).unwrap());
        let scheduler = FlushScheduler::spawn(Arc::clone(&shard));

        for id in 0..3 {
            shard.ingest_text(id, &format!("doc {id}")).unwrap();
        }
        assert!(wait_for_docs(&shard, 3).await);

        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_flushes_on_interval() {
        let dir = TempDir::new().unwrap();
        let mut config = ShardConfig::new(dir.path());
        config.sync_policy = SyncPolicy::Never;
        config.flush_docs = 10_000;
        config.flush_interval_ms = 20;
        let shard = Arc::new(Shard::open(config).unwrap());
        let scheduler = FlushScheduler::spawn(Arc::clone(&shard));

        shard.ingest_text(1, "lonely").unwrap();
        assert!(wait_for_docs(&shard, 1).await);
        assert_eq!(shard.stats().buffered_docs, 0);

        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_exits_when_shard_stops() {
        let dir = TempDir::new().unwrap();
        let shard = Arc::new(Shard::open(ShardConfig::new(dir.path())).unwrap());
        let scheduler = FlushScheduler::spawn(Arc::clone(&shard));

        shard.shutdown().unwrap();
        for _ in 0..500 {
            if scheduler.is_finished() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(scheduler.is_finished());
    }
}
