// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Runlet Manager - Worker Registry and Routine Scheduler
//!
//! An HTTP server responsible for:
//! - Accepting worker subscriptions and load reports
//! - Evicting workers that stop reporting
//! - Reconciling routine programs from tenant databases
//! - Dispatching routine firings to the least loaded worker

use tracing::{info, warn};

use runlet_manager::config::Config;
use runlet_manager::runtime::ManagerRuntimeBuilder;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "runlet_manager=info".into()),
        )
        .init();

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    let config = Config::from_env()?;

    info!(
        http_addr = %config.http_addr,
        sweep_interval_secs = config.sweep_interval.as_secs(),
        reconcile_interval_secs = config.reconcile_interval.as_secs(),
        worker_timeout_secs = config.worker_timeout.as_secs(),
        "Starting Runlet Manager"
    );

    let runtime = ManagerRuntimeBuilder::from_config(&config)
        .build()?
        .start()
        .await?;

    info!(addr = %runtime.local_addr(), "Manager ready");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    runtime.shutdown().await?;

    info!("Runlet Manager shut down");

    Ok(())
}
