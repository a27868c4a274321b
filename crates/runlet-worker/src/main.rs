// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Runlet Worker - Program Execution Server
//!
//! An HTTP server responsible for:
//! - Compiling and caching tenant programs
//! - Running tasks inside the Lua sandbox with a hard deadline
//! - Bridging inbound HTTP requests to CGI-mode programs
//! - Subscribing to the manager and reporting load

use tracing::{info, warn};

use runlet_worker::config::Config;
use runlet_worker::runtime::WorkerRuntimeBuilder;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "runlet_worker=info,runlet_sandbox=info".into()),
        )
        .init();

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    let config = Config::from_env()?;

    info!(
        http_addr = %config.http_addr,
        worker_id = %config.worker_id,
        manager_url = %config.manager_url,
        library_url = %config.library_url,
        program_ttl_secs = config.program_ttl.as_secs(),
        "Starting Runlet Worker"
    );

    let runtime = WorkerRuntimeBuilder::from_config(&config)
        .build()?
        .start()
        .await?;

    info!(addr = %runtime.local_addr(), "Worker ready");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    runtime.shutdown().await?;

    info!("Runlet Worker shut down");

    Ok(())
}
