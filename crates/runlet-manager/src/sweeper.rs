// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Background worker evicting workers that stopped reporting load.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{info, warn};

use crate::workforce::Workforce;

/// Configuration for the liveness sweeper.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// How often to look for dead workers.
    pub interval: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
        }
    }
}

/// Periodically runs [`Workforce::sweep_inactive`].
pub struct Sweeper {
    workforce: Arc<Workforce>,
    config: SweeperConfig,
    shutdown: Arc<Notify>,
}

impl Sweeper {
    /// Create a new sweeper.
    pub fn new(workforce: Arc<Workforce>, config: SweeperConfig) -> Self {
        Self {
            workforce,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Get a handle that can be used to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Run the sweep loop until shutdown.
    pub async fn run(&self) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            timeout_secs = self.workforce.timeout().as_secs(),
            "Workforce sweeper started"
        );

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("Workforce sweeper received shutdown signal");
                    break;
                }

                _ = tokio::time::sleep(self.config.interval) => {
                    self.sweep_once();
                }
            }
        }

        info!("Workforce sweeper stopped");
    }

    /// Evict dead workers once. Returns how many were removed.
    pub fn sweep_once(&self) -> usize {
        let swept = self.workforce.sweep_inactive();
        for worker in &swept {
            warn!(
                worker_id = %worker.id,
                uri = %worker.base_uri(),
                "Evicted worker that stopped reporting load"
            );
        }
        swept.len()
    }
}
