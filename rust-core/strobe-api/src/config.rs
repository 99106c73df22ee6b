// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// Strobe API - Configuration
//
// Command-line flags with environment fallbacks. Every option can be given
// either way; flags win.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use serde::Serialize;
use strobe_shard::ShardConfig;
use strobe_wal::SyncPolicy;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `h2` needs a certificate and key.
    #[error("MODE=h2 requires both CERT and KEY")]
    MissingTls,

    /// A TLS file does not exist.
    #[error("TLS file not found: {0}")]
    TlsFileNotFound(PathBuf),

    /// A limit that must be positive was zero.
    #[error("{0} must be greater than 0")]
    Zero(&'static str),

    /// The shard settings are inconsistent.
    #[error("{0}")]
    Shard(String),
}

/// HTTP transport served on the bind address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
pub enum Transport {
    /// HTTP/1.1 plaintext.
    #[value(name = "h1")]
    #[serde(rename = "h1")]
    H1,
    /// HTTP/2 cleartext, prior knowledge.
    #[value(name = "h2c")]
    #[serde(rename = "h2c")]
    H2c,
    /// HTTP/2 over TLS.
    #[value(name = "h2")]
    #[serde(rename = "h2")]
    H2,
}

impl Transport {
    /// Short protocol name reported by `/proto`.
    pub fn as_str(self) -> &'static str {
        match self {
            Transport::H1 => "h1",
            Transport::H2c => "h2c",
            Transport::H2 => "h2",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable.
    Text,
    /// One JSON object per line.
    Json,
}

/// Command-line arguments for the `strobe` server.
#[derive(Parser, Debug, Clone)]
#[command(name = "strobe", version, about = "Bit-signature search shard")]
pub struct ServerArgs {
    /// Transport: h1, h2c or h2 (TLS).
    #[arg(long, env = "MODE", value_enum, default_value_t = Transport::H1)]
    pub mode: Transport,

    /// Address to listen on.
    #[arg(long, env = "BIND", default_value = "0.0.0.0:7700")]
    pub bind: SocketAddr,

    /// Root data directory.
    #[arg(long, env = "DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Number of shards in the deployment.
    #[arg(long, env = "SHARDS", default_value_t = 1)]
    pub shards: u32,

    /// This shard's index.
    #[arg(long, env = "SHARD_ID", default_value_t = 0)]
    pub shard_id: u32,

    /// WAL sync policy: always, never or coalesce:<bytes>.
    #[arg(long, env = "WAL_SYNC", default_value = "coalesce:1048576")]
    pub wal_sync: SyncPolicy,

    /// Buffered documents that trigger a flush.
    #[arg(long, env = "FLUSH_DOCS", default_value_t = 4096)]
    pub flush_docs: usize,

    /// Longest a document waits before a flush, in milliseconds.
    #[arg(long, env = "FLUSH_MS", default_value_t = 5)]
    pub flush_ms: u64,

    /// Ingest is refused beyond this many unflushed documents.
    #[arg(long, env = "MAX_BUFFERED_DOCS", default_value_t = 262_144)]
    pub max_buffered_docs: usize,

    /// Concurrent searches before new ones are shed.
    #[arg(long, env = "MAX_INFLIGHT_QUERIES", default_value_t = 4096)]
    pub max_inflight_queries: usize,

    /// Documents per segment built during boot replay.
    #[arg(long, env = "REPLAY_SEG_DOCS", default_value_t = 200_000)]
    pub replay_seg_docs: usize,

    /// Segment count that triggers a merge after flush.
    #[arg(long, env = "MAX_SEGMENTS", default_value_t = 64)]
    pub max_segments: usize,

    /// PEM certificate chain (h2 only).
    #[arg(long, env = "CERT")]
    pub cert: Option<PathBuf>,

    /// PEM private key (h2 only).
    #[arg(long, env = "KEY")]
    pub key: Option<PathBuf>,

    /// Log output format.
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

/// Certificate and key locations.
#[derive(Debug, Clone)]
pub struct TlsPaths {
    /// PEM certificate chain.
    pub cert: PathBuf,
    /// PEM private key.
    pub key: PathBuf,
}

/// Validated server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Transport to serve.
    pub transport: Transport,
    /// Listen address.
    pub bind: SocketAddr,
    /// Shard settings.
    pub shard: ShardConfig,
    /// Query shedding limit.
    pub max_inflight_queries: usize,
    /// TLS material, present exactly when `transport` is `H2`.
    pub tls: Option<TlsPaths>,
}

impl ServerConfig {
    /// Validate parsed arguments.
    pub fn from_args(args: ServerArgs) -> Result<Self, ConfigError> {
        if args.max_inflight_queries == 0 {
            return Err(ConfigError::Zero("MAX_INFLIGHT_QUERIES"));
        }

        let tls = match args.mode {
            Transport::H2 => {
                let (Some(cert), Some(key)) = (args.cert, args.key) else {
                    return Err(ConfigError::MissingTls);
                };
                for path in [&cert, &key] {
                    if !path.is_file() {
                        return Err(ConfigError::TlsFileNotFound(path.clone()));
                    }
                }
                Some(TlsPaths { cert, key })
            }
            Transport::H1 | Transport::H2c => None,
        };

        let mut shard = ShardConfig::new(args.data_dir);
        shard.shard_id = args.shard_id;
        shard.shard_count = args.shards;
        shard.sync_policy = args.wal_sync;
        shard.flush_docs = args.flush_docs;
        shard.flush_interval_ms = args.flush_ms;
        shard.max_buffered_docs = args.max_buffered_docs;
        shard.replay_segment_docs = args.replay_seg_docs;
        shard.max_segments = args.max_segments;
        shard
            .validate()
            .map_err(|err| ConfigError::Shard(err.to_string()))?;

        Ok(Self {
            transport: args.mode,
            bind: args.bind,
            shard,
            max_inflight_queries: args.max_inflight_queries,
            tls,
        })
    }
}
