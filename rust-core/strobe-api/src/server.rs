// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// Strobe API - Transports and process lifecycle
//
// `h1` and `h2c` are served with hyper's connection builders so each mode
// speaks exactly one protocol. `h2` terminates TLS with rustls (ring
// provider) through axum-server; ALPN offers h2 and http/1.1.
//
// Shutdown order: stop accepting, drain connections, stop the flush
// scheduler, then a final shard flush.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use hyper::server::conn::{http1, http2};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::graceful::GracefulShutdown;
use hyper_util::service::TowerToHyperService;
use strobe_shard::{FlushScheduler, Shard, ShardError};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::{ServerConfig, TlsPaths, Transport};
use crate::{build_router, AppState};

/// Longest wait for open connections after shutdown begins.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

const H2_MAX_CONCURRENT_STREAMS: u32 = 1024;
const H2_CONNECTION_WINDOW: u32 = 16 * 1024 * 1024;
const H2_STREAM_WINDOW: u32 = 1024 * 1024;

/// Errors that end the server.
#[derive(Debug, Error)]
pub enum ServeError {
    /// The shard could not be opened or shut down cleanly.
    #[error("shard error: {0}")]
    Shard(#[from] ShardError),

    /// Binding or accepting failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The metrics registry rejected a metric.
    #[error("metrics setup failed: {0}")]
    Metrics(#[from] prometheus::Error),

    /// TLS material could not be loaded.
    #[error("TLS setup failed: {0}")]
    Tls(String),

    /// A blocking task panicked.
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Open the shard, serve until a shutdown signal, then stop cleanly.
pub async fn run(config: ServerConfig) -> Result<(), ServeError> {
    strobe_signature::kernel();

    let shard_config = config.shard.clone();
    let shard = Arc::new(tokio::task::spawn_blocking(move || Shard::open(shard_config)).await??);
    let scheduler = FlushScheduler::spawn(Arc::clone(&shard));
    let state = AppState::new(
        Arc::clone(&shard),
        config.max_inflight_queries,
        config.transport,
    )?;
    let router = build_router(state);

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received");
        // The receiver is gone only if the server already exited.
        let _ = stop_tx.send(true);
    });

    let served = serve(router, &config, stop_rx).await;

    scheduler.shutdown().await;
    let closed = tokio::task::spawn_blocking(move || shard.shutdown()).await;

    served?;
    closed??;
    info!("Strobe shard stopped");
    Ok(())
}

/// Serve `router` on the configured transport until `shutdown` turns true.
pub async fn serve(
    router: Router,
    config: &ServerConfig,
    shutdown: watch::Receiver<bool>,
) -> Result<(), ServeError> {
    match (config.transport, &config.tls) {
        (Transport::H2, Some(tls)) => serve_tls(router, config.bind, tls, shutdown).await,
        (Transport::H2, None) => Err(ServeError::Tls(
            "h2 requires a certificate and key".to_string(),
        )),
        (transport, _) => {
            let listener = TcpListener::bind(config.bind).await?;
            serve_plain(listener, router, transport, shutdown).await
        }
    }
}

/// Plaintext accept loop. `H2c` speaks HTTP/2 with prior knowledge; any
/// other transport value serves HTTP/1.1.
pub async fn serve_plain(
    listener: TcpListener,
    router: Router,
    transport: Transport,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), ServeError> {
    info!(addr = %listener.local_addr()?, %transport, "Listening");
    let graceful = GracefulShutdown::new();

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(err) => {
                    warn!(error = %err, "Accept failed");
                    continue;
                }
            },
            _ = stop_requested(&mut shutdown) => break,
        };
        if let Err(err) = stream.set_nodelay(true) {
            debug!(%peer, error = %err, "set_nodelay failed");
        }

        let io = TokioIo::new(stream);
        let service = TowerToHyperService::new(router.clone());
        match transport {
            Transport::H2c => {
                let mut builder = http2::Builder::new(TokioExecutor::new());
                builder
                    .max_concurrent_streams(H2_MAX_CONCURRENT_STREAMS)
                    .initial_connection_window_size(H2_CONNECTION_WINDOW)
                    .initial_stream_window_size(H2_STREAM_WINDOW);
                let connection = graceful.watch(builder.serve_connection(io, service));
                tokio::spawn(async move {
                    if let Err(err) = connection.await {
                        debug!(%peer, error = %err, "h2c connection ended with error");
                    }
                });
            }
            Transport::H1 | Transport::H2 => {
                let connection = graceful.watch(
                    http1::Builder::new()
                        .keep_alive(true)
                        .pipeline_flush(true)
                        .serve_connection(io, service),
                );
                tokio::spawn(async move {
                    if let Err(err) = connection.await {
                        debug!(%peer, error = %err, "h1 connection ended with error");
                    }
                });
            }
        }
    }

    info!("Listener closed, draining connections");
    tokio::select! {
        _ = graceful.shutdown() => debug!("All connections drained"),
        _ = tokio::time::sleep(DRAIN_TIMEOUT) => {
            warn!(timeout_secs = DRAIN_TIMEOUT.as_secs(), "Drain timed out");
        }
    }
    Ok(())
}

async fn serve_tls(
    router: Router,
    addr: SocketAddr,
    tls: &TlsPaths,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), ServeError> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        debug!("rustls crypto provider already installed");
    }
    let rustls_config = RustlsConfig::from_pem_file(&tls.cert, &tls.key)
        .await
        .map_err(|err| ServeError::Tls(format!("{}: {err}", tls.cert.display())))?;

    let handle = axum_server::Handle::new();
    let drain = handle.clone();
    tokio::spawn(async move {
        stop_requested(&mut shutdown).await;
        info!("Listener closing, draining connections");
        drain.graceful_shutdown(Some(DRAIN_TIMEOUT));
    });

    info!(%addr, transport = %Transport::H2, "Listening");
    axum_server::bind_rustls(addr, rustls_config)
        .handle(handle)
        .serve(router.into_make_service())
        .await?;
    Ok(())
}

/// Resolves once the shutdown flag is set or its sender is dropped.
async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        let stop = *shutdown.borrow_and_update();
        if stop || shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Resolves on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "Cannot listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
