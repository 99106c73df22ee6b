// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// Strobe API - Prometheus metrics
//
// Request counters and latency are updated by the handlers. Shard gauges are
// refreshed from `ShardStats` on every scrape.

use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use strobe_shard::{ShardHealth, ShardStats};

/// Search latency buckets in seconds, 50us to 1s.
const LATENCY_BUCKETS: &[f64] = &[
    0.000_05, 0.000_1, 0.000_25, 0.000_5, 0.001, 0.002_5, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25,
    0.5, 1.0,
];

/// Metrics owned by the HTTP layer.
#[derive(Clone)]
pub struct ApiMetrics {
    registry: Registry,
    /// Answered searches by mode (`exact`, `fuzzy`).
    pub searches: IntCounterVec,
    /// Refused requests by route and error code.
    pub rejected: IntCounterVec,
    /// Search latency.
    pub search_latency: Histogram,
    /// Documents accepted by ingest.
    pub ingested_docs: IntCounter,
    resident_docs: IntGauge,
    buffered_docs: IntGauge,
    segments: IntGauge,
    snapshot_version: IntGauge,
    durable_sequence: IntGauge,
    health: IntGauge,
}

impl ApiMetrics {
    /// Build and register every metric in a fresh registry.
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let searches = IntCounterVec::new(
            Opts::new("strobe_search_requests_total", "Searches answered"),
            &["mode"],
        )?;
        registry.register(Box::new(searches.clone()))?;

        let rejected = IntCounterVec::new(
            Opts::new("strobe_rejected_requests_total", "Requests refused"),
            &["route", "code"],
        )?;
        registry.register(Box::new(rejected.clone()))?;

        let search_latency = Histogram::with_opts(
            HistogramOpts::new("strobe_search_duration_seconds", "Search latency")
                .buckets(LATENCY_BUCKETS.to_vec()),
        )?;
        registry.register(Box::new(search_latency.clone()))?;

        let ingested_docs =
            IntCounter::new("strobe_ingested_documents_total", "Documents accepted")?;
        registry.register(Box::new(ingested_docs.clone()))?;

        let gauge = |name: &str, help: &str| -> prometheus::Result<IntGauge> {
            let gauge = IntGauge::new(name, help)?;
            registry.register(Box::new(gauge.clone()))?;
            Ok(gauge)
        };
        let resident_docs = gauge("strobe_resident_documents", "Queryable documents")?;
        let buffered_docs = gauge("strobe_buffered_documents", "Documents awaiting flush")?;
        let segments = gauge("strobe_segments", "Segments in the published snapshot")?;
        let snapshot_version = gauge("strobe_snapshot_version", "Published snapshot version")?;
        let durable_sequence = gauge("strobe_durable_sequence", "Highest synced WAL sequence")?;
        let health = gauge(
            "strobe_health_state",
            "0=starting 1=serving 2=degraded 3=stopped",
        )?;

        Ok(Self {
            registry,
            searches,
            rejected,
            search_latency,
            ingested_docs,
            resident_docs,
            buffered_docs,
            segments,
            snapshot_version,
            durable_sequence,
            health,
        })
    }

    /// Count a refused request.
    pub fn reject(&self, route: &str, code: &str) {
        self.rejected.with_label_values(&[route, code]).inc();
    }

    /// Refresh shard gauges and encode the registry in text format.
    pub fn render(&self, stats: &ShardStats) -> prometheus::Result<String> {
        self.resident_docs.set(saturating_i64(stats.resident_docs as u64));
        self.buffered_docs.set(saturating_i64(stats.buffered_docs as u64));
        self.segments.set(saturating_i64(stats.segments as u64));
        self.snapshot_version.set(saturating_i64(stats.snapshot_version));
        self.durable_sequence.set(saturating_i64(stats.durable_sequence));
        self.health.set(health_code(stats.health));

        TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn health_code(health: ShardHealth) -> i64 {
    health as u8 as i64
}
