// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// Strobe server binary
//
// Parses flags and environment, opens the shard and serves until SIGINT or
// SIGTERM.

use anyhow::Context;
use clap::Parser;
use strobe_api::{init_tracing, ServerArgs, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ServerArgs::parse();
    init_tracing(args.log_format);

    let config = ServerConfig::from_args(args).context("invalid configuration")?;

    tracing::info!(
        bind = %config.bind,
        transport = %config.transport,
        shard_id = config.shard.shard_id,
        shard_count = config.shard.shard_count,
        sync_policy = %config.shard.sync_policy,
        "Starting Strobe shard server"
    );

    strobe_api::run(config).await.context("server failed")?;
    Ok(())
}
