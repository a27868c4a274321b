// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Background worker keeping scheduled routines in sync with tenant databases.
//!
//! Each pass lists the tenants, scans every tenant for its routines and feeds
//! them to the [`ProgramCache`]. A tenant whose scan fails keeps its current
//! schedule for that pass; other tenants proceed normally.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::program_cache::{ProgramCache, ReconcileSummary};
use crate::store::{ProgramStore, TenantDirectory};

/// Configuration for the reconciler.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Time between passes.
    pub interval: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
        }
    }
}

/// Periodically reconciles the program cache against tenant databases.
pub struct Reconciler {
    directory: Arc<dyn TenantDirectory>,
    store: Arc<dyn ProgramStore>,
    cache: Arc<ProgramCache>,
    config: ReconcilerConfig,
    shutdown: Arc<Notify>,
}

impl Reconciler {
    /// Create a new reconciler.
    pub fn new(
        directory: Arc<dyn TenantDirectory>,
        store: Arc<dyn ProgramStore>,
        cache: Arc<ProgramCache>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            directory,
            store,
            cache,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Get a handle that can be used to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Run a pass immediately, then one per interval until shutdown.
    ///
    /// Every trigger is stopped on exit.
    pub async fn run(&self) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            "Reconciler started"
        );

        if let Err(e) = self.reconcile_once().await {
            error!(error = %e, "Reconciliation failed");
        }

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("Reconciler received shutdown signal");
                    break;
                }

                _ = tokio::time::sleep(self.config.interval) => {
                    if let Err(e) = self.reconcile_once().await {
                        error!(error = %e, "Reconciliation failed");
                    }
                }
            }
        }

        self.cache.stop_all();
        info!("Reconciler stopped");
    }

    /// Run one reconciliation pass.
    ///
    /// Fails without touching the cache when the tenant list cannot be read.
    pub async fn reconcile_once(&self) -> Result<ReconcileSummary> {
        let domains = self.directory.domains().await?;

        self.cache.begin()?;
        let mut failed = 0;
        for domain in &domains {
            match self.store.routines(domain).await {
                Ok(programs) => {
                    for program in programs {
                        self.cache.observe(program);
                    }
                }
                Err(e) => {
                    failed += 1;
                    let retained = self.cache.retain_domain(domain);
                    warn!(
                        domain = %domain,
                        error = %e,
                        retained,
                        "Tenant scan failed; keeping its routines"
                    );
                }
            }
        }
        let summary = self.cache.commit()?;

        info!(
            tenants = domains.len(),
            failed,
            added = summary.added,
            replaced = summary.replaced,
            unchanged = summary.unchanged,
            removed = summary.removed,
            "Reconciliation pass complete"
        );
        Ok(summary)
    }
}
