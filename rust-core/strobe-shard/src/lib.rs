// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// Strobe shard crate
//
// One `Shard` owns one WAL and one lineage of index snapshots for a static
// `(shard_id, shard_count)` partition of the document space.
//
// # Lifecycle
//
// ```text
// Shard::open  -> WAL recovery, index rebuild, Starting -> Serving
// ingest*      -> WAL append + flush buffer (Serving only)
// search       -> lock-free scan of the published snapshot (Serving, Degraded)
// flush_now    -> checkpoint + segment build + snapshot swap
// shutdown     -> final flush, -> Stopped
// ```
//
// A `FlushScheduler` drives `flush_now` from a tokio task.
//
// ## Usage
//
// ```no_run
// use strobe_shard::{Shard, ShardConfig};
// use strobe_wire::Query;
//
// let shard = Shard::open(ShardConfig::new("./data")).unwrap();
// shard.ingest_text(1, "tok47591").unwrap();
// shard.flush_now().unwrap();
//
// let query = Query::exact(1, shard.signature_of("tok47591")).unwrap();
// assert_eq!(shard.search(&query).unwrap()[0].doc_id, 1);
// ```

pub mod buffer;
pub mod config;
pub mod error;
pub mod health;
pub mod scheduler;
pub mod shard;

pub use buffer::{FlushBatch, FlushBuffer};
pub use config::ShardConfig;
pub use error::{ShardError, ShardResult};
pub use health::{HealthCell, HealthReport, ShardHealth};
pub use scheduler::FlushScheduler;
pub use shard::{FlushOutcome, IngestReceipt, Shard, ShardStats};
