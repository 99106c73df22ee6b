// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// Strobe API
//
// HTTP surface of a Strobe shard. The binary query route is the hot path:
// a fixed-size frame in, a hit frame out. JSON routes cover text search,
// ingest and operations.
//
// Routes:
//
// ```text
// POST /search        binary query frame  -> binary hit frame
// POST /search/text   {text, k, fuzzy}    -> {hits}
// POST /ingest        {documents: [...]}  -> 202 + X-Ingested
// POST /ingest/lines  doc_id<TAB>text     -> 202 + X-Ingested
// POST /ingest.bin    binary text frames  -> 202 + X-Ingested
// POST /flush                             -> FlushOutcome
// GET  /health                            -> 200 serving/degraded, 503 otherwise
// GET  /stats                             -> ShardStats
// GET  /metrics                           -> Prometheus text
// GET  /proto                             -> h1 | h2c | h2
// ```
//
// Queries run on the blocking pool while holding a permit, so a burst of
// large scans cannot starve the async workers serving `/health` and the
// shedding path.

pub mod config;
pub mod error;
pub mod metrics;
pub mod server;
pub mod telemetry;

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strobe_index::Hit;
use strobe_shard::{Shard, ShardHealth};
use strobe_signature::Signature;
use strobe_wire::{decode_query, encode_hits, Query, QueryFlags, WireHit};
use bytes::Buf;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument};

pub use config::{ConfigError, LogFormat, ServerArgs, ServerConfig, TlsPaths, Transport};
pub use error::{ApiError, ErrorResponse};
pub use metrics::ApiMetrics;
pub use server::{run, serve, ServeError};
pub use telemetry::init_tracing;

/// Header carrying the number of documents an ingest call accepted.
pub const X_INGESTED: HeaderName = HeaderName::from_static("x-ingested");

/// Ingest bodies may be far larger than query frames.
pub const MAX_INGEST_BODY_BYTES: usize = 64 * 1024 * 1024;

const OCTET_STREAM: &str = "application/octet-stream";
const PROMETHEUS_TEXT: &str = "text/plain; version=0.0.4";

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    shard: Arc<Shard>,
    query_permits: Arc<Semaphore>,
    metrics: ApiMetrics,
    transport: Transport,
}

impl AppState {
    /// Wrap an open shard.
    pub fn new(
        shard: Arc<Shard>,
        max_inflight_queries: usize,
        transport: Transport,
    ) -> prometheus::Result<Self> {
        Ok(Self {
            shard,
            query_permits: Arc::new(Semaphore::new(max_inflight_queries)),
            metrics: ApiMetrics::new()?,
            transport,
        })
    }

    /// The shard behind this server.
    pub fn shard(&self) -> &Arc<Shard> {
        &self.shard
    }

    /// HTTP metrics.
    pub fn metrics(&self) -> &ApiMetrics {
        &self.metrics
    }

    async fn search(&self, query: Query) -> Result<Vec<Hit>, ApiError> {
        let permit = Arc::clone(&self.query_permits)
            .try_acquire_owned()
            .map_err(|_| ApiError::Overloaded("too many concurrent queries".to_string()))?;

        let mode = if query.is_fuzzy() { "fuzzy" } else { "exact" };
        let shard = Arc::clone(&self.shard);
        let timer = self.metrics.search_latency.start_timer();
        let result = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            shard.search(&query)
        })
        .await
        .map_err(|err| ApiError::Internal(format!("search task failed: {err}")))
        .and_then(|result| result.map_err(ApiError::from));

        match result {
            Ok(hits) => {
                timer.observe_duration();
                self.metrics.searches.with_label_values(&[mode]).inc();
                Ok(hits)
            }
            Err(err) => {
                timer.stop_and_discard();
                Err(err)
            }
        }
    }

    fn rejected(&self, route: &str, err: ApiError) -> ApiError {
        debug!(route, code = err.code(), error = %err, "request rejected");
        self.metrics.reject(route, err.code());
        err
    }
}

// ---------------------------------------------------------------------------
// Request and response bodies
// ---------------------------------------------------------------------------

fn default_k() -> u16 {
    10
}

fn default_fuzzy() -> bool {
    true
}

/// Text search request. The signature is built server-side.
#[derive(Debug, Deserialize)]
pub struct TextSearchRequest {
    /// Query text.
    pub text: String,
    /// Maximum results.
    #[serde(default = "default_k")]
    pub k: u16,
    /// Fuzzy (default) or exact matching.
    #[serde(default = "default_fuzzy")]
    pub fuzzy: bool,
}

/// Text search response.
#[derive(Debug, Serialize)]
pub struct TextSearchResponse {
    /// Hits, best first.
    pub hits: Vec<Hit>,
}

/// One document in an ingest request. Exactly one of `text` and
/// `signature` must be present.
#[derive(Debug, Deserialize)]
pub struct IngestDocument {
    /// Document id.
    pub doc_id: u64,
    /// Raw text to sign.
    #[serde(default)]
    pub text: Option<String>,
    /// Pre-built signature as 64 words.
    #[serde(default)]
    pub signature: Option<Signature>,
}

/// JSON ingest request.
#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    /// Documents in log order.
    pub documents: Vec<IngestDocument>,
}

/// Health route body.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Shard state.
    pub status: ShardHealth,
    /// When the state was entered.
    pub since: DateTime<Utc>,
    /// Failure reason, if degraded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// This shard.
    pub shard_id: u32,
    /// Server version.
    pub version: String,
}

enum Payload {
    Text(String),
    Signature(Signature),
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the API router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Search
        .route("/search", post(search_handler).options(preflight_handler))
        .route(
            "/search/text",
            post(text_search_handler).options(preflight_handler),
        )
        // Ingest
        .route(
            "/ingest",
            post(ingest_handler)
                .options(preflight_handler)
                .layer(DefaultBodyLimit::max(MAX_INGEST_BODY_BYTES)),
        )
        .route(
            "/ingest/lines",
            post(ingest_lines_handler)
                .options(preflight_handler)
                .layer(DefaultBodyLimit::max(MAX_INGEST_BODY_BYTES)),
        )
        .route(
            "/ingest.bin",
            post(ingest_frames_handler)
                .options(preflight_handler)
                .layer(DefaultBodyLimit::max(MAX_INGEST_BODY_BYTES)),
        )
        // Operations
        .route("/flush", post(flush_handler))
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/metrics", get(metrics_handler))
        .route("/proto", get(proto_handler))
        .layer(middleware::map_response(cors_headers))
        .with_state(state)
}

async fn cors_headers(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("content-type"),
    );
    headers.insert(
        header::ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static("x-ingested, retry-after"),
    );
    response
}

async fn preflight_handler() -> StatusCode {
    StatusCode::NO_CONTENT
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

/// Binary search handler.
#[instrument(skip(state, body), fields(frame_len = body.len()))]
async fn search_handler(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let query = decode_query(&body).map_err(|err| state.rejected("search", err.into()))?;
    let hits = state
        .search(query)
        .await
        .map_err(|err| state.rejected("search", err))?;

    let wire: Vec<WireHit> = hits.into_iter().map(Hit::to_wire).collect();
    Ok((
        [(header::CONTENT_TYPE, HeaderValue::from_static(OCTET_STREAM))],
        encode_hits(&wire),
    )
        .into_response())
}

/// JSON text search handler.
#[instrument(skip(state, body))]
async fn text_search_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<TextSearchResponse>, ApiError> {
    let parse = || -> Result<Query, ApiError> {
        let request: TextSearchRequest = serde_json::from_slice(&body)
            .map_err(|err| ApiError::BadRequest(format!("invalid search body: {err}")))?;
        let flags = if request.fuzzy {
            QueryFlags::FUZZY
        } else {
            QueryFlags::EXACT
        };
        Ok(Query::new(request.k, flags, state.shard.signature_of(&request.text))?)
    };

    let query = parse().map_err(|err| state.rejected("search_text", err))?;
    let hits = state
        .search(query)
        .await
        .map_err(|err| state.rejected("search_text", err))?;
    Ok(Json(TextSearchResponse { hits }))
}

// ---------------------------------------------------------------------------
// Ingest
// ---------------------------------------------------------------------------

/// JSON ingest handler.
#[instrument(skip(state, body), fields(body_len = body.len()))]
async fn ingest_handler(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let documents = parse_ingest_json(&body).map_err(|err| state.rejected("ingest", err))?;
    ingest(&state, "ingest", documents).await
}

/// Line-oriented ingest handler: `doc_id<TAB>text` per line.
#[instrument(skip(state, body), fields(body_len = body.len()))]
async fn ingest_lines_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let documents = parse_ingest_lines(&body).map_err(|err| state.rejected("ingest_lines", err))?;
    ingest(&state, "ingest_lines", documents).await
}

/// Binary ingest handler: little-endian `[u64 doc_id][u32 len][len bytes]`
/// frames back to back, each payload UTF-8 text.
#[instrument(skip(state, body), fields(body_len = body.len()))]
async fn ingest_frames_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let documents = parse_ingest_frames(body).map_err(|err| state.rejected("ingest_bin", err))?;
    ingest(&state, "ingest_bin", documents).await
}

const FRAME_HEADER_LEN: usize = 8 + 4;

fn parse_ingest_frames(mut body: Bytes) -> Result<Vec<(u64, Payload)>, ApiError> {
    let mut documents = Vec::new();
    while body.has_remaining() {
        let frame = documents.len();
        if body.remaining() < FRAME_HEADER_LEN {
            return Err(ApiError::BadRequest(format!(
                "frame {frame}: truncated header ({} of {FRAME_HEADER_LEN} bytes)",
                body.remaining()
            )));
        }
        let doc_id = body.get_u64_le();
        let len = body.get_u32_le() as usize;
        if body.remaining() < len {
            return Err(ApiError::BadRequest(format!(
                "frame {frame}: document {doc_id} declares {len} bytes, {} remain",
                body.remaining()
            )));
        }
        let text = body.split_to(len);
        let text = std::str::from_utf8(&text).map_err(|err| {
            ApiError::BadRequest(format!("frame {frame}: document {doc_id} is not UTF-8: {err}"))
        })?;
        documents.push((doc_id, Payload::Text(text.to_string())));
    }
    Ok(documents)
}

fn parse_ingest_json(body: &[u8]) -> Result<Vec<(u64, Payload)>, ApiError> {
    let request: IngestRequest = serde_json::from_slice(body)
        .map_err(|err| ApiError::BadRequest(format!("invalid ingest body: {err}")))?;

    request
        .documents
        .into_iter()
        .map(|document| match (document.text, document.signature) {
            (Some(text), None) => Ok((document.doc_id, Payload::Text(text))),
            (None, Some(signature)) => Ok((document.doc_id, Payload::Signature(signature))),
            _ => Err(ApiError::BadRequest(format!(
                "document {} needs exactly one of text or signature",
                document.doc_id
            ))),
        })
        .collect()
}

fn parse_ingest_lines(body: &[u8]) -> Result<Vec<(u64, Payload)>, ApiError> {
    let body = std::str::from_utf8(body)
        .map_err(|err| ApiError::BadRequest(format!("ingest body is not UTF-8: {err}")))?;

    let mut documents = Vec::new();
    for (index, line) in body.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let line_no = index + 1;
        let (id, text) = line.split_once('\t').ok_or_else(|| {
            ApiError::BadRequest(format!("line {line_no}: expected doc_id<TAB>text"))
        })?;
        let doc_id = id.trim().parse::<u64>().map_err(|err| {
            ApiError::BadRequest(format!("line {line_no}: invalid doc_id {id:?}: {err}"))
        })?;
        documents.push((doc_id, Payload::Text(text.to_string())));
    }
    Ok(documents)
}

async fn ingest(
    state: &AppState,
    route: &'static str,
    documents: Vec<(u64, Payload)>,
) -> Result<Response, ApiError> {
    let shard = Arc::clone(&state.shard);
    let outcome = tokio::task::spawn_blocking(move || {
        let batch = documents
            .into_iter()
            .map(|(doc_id, payload)| match payload {
                Payload::Text(text) => (doc_id, shard.signature_of(&text)),
                Payload::Signature(signature) => (doc_id, signature),
            })
            .collect();
        shard.ingest_batch(batch)
    })
    .await
    .map_err(|err| ApiError::Internal(format!("ingest task failed: {err}")))
    .and_then(|result| result.map_err(ApiError::from));

    let receipt = outcome.map_err(|err| state.rejected(route, err))?;
    state.metrics.ingested_docs.inc_by(receipt.accepted as u64);

    let mut response = (StatusCode::ACCEPTED, Json(receipt)).into_response();
    response
        .headers_mut()
        .insert(X_INGESTED, HeaderValue::from(receipt.accepted));
    Ok(response)
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Force a flush.
#[instrument(skip(state))]
async fn flush_handler(State(state): State<AppState>) -> Result<Response, ApiError> {
    let shard = Arc::clone(&state.shard);
    let outcome = tokio::task::spawn_blocking(move || shard.flush_now())
        .await
        .map_err(|err| ApiError::Internal(format!("flush task failed: {err}")))
        .and_then(|result| result.map_err(ApiError::from))
        .map_err(|err| state.rejected("flush", err))?;

    info!(
        version = outcome.version,
        documents = outcome.documents,
        "flush requested over HTTP"
    );
    Ok(Json(outcome).into_response())
}

/// Health check handler
#[instrument(skip(state))]
async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let report = state.shard.health_report();
    let status = if report.state.is_readable() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(HealthResponse {
            status: report.state,
            since: report.since,
            reason: report.reason,
            shard_id: state.shard.config().shard_id,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

#[instrument(skip(state))]
async fn stats_handler(State(state): State<AppState>) -> Json<strobe_shard::ShardStats> {
    Json(state.shard.stats())
}

#[instrument(skip(state))]
async fn metrics_handler(State(state): State<AppState>) -> Result<Response, ApiError> {
    let text = state
        .metrics
        .render(&state.shard.stats())
        .map_err(|err| ApiError::Internal(format!("metrics encoding failed: {err}")))?;
    Ok((
        [(header::CONTENT_TYPE, HeaderValue::from_static(PROMETHEUS_TEXT))],
        text,
    )
        .into_response())
}

async fn proto_handler(State(state): State<AppState>) -> &'static str {
    state.transport.as_str()
}
