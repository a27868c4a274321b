// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable runtime for runlet-manager.
//!
//! ```rust,ignore
//! use runlet_manager::runtime::ManagerRuntime;
//!
//! let runtime = ManagerRuntime::builder()
//!     .bind_addr("0.0.0.0:8080".parse()?)
//!     .database_url("postgres://localhost/runlet")
//!     .build()?
//!     .start()
//!     .await?;
//!
//! // ... workers subscribe, routines fire ...
//!
//! runtime.shutdown().await?;
//! ```
//!
//! Tests and embedders can pass any [`TenantDirectory`] + [`ProgramStore`]
//! (e.g. [`MemoryProgramStore`](crate::store::MemoryProgramStore)) through
//! [`ManagerRuntimeBuilder::store`] instead of a database URL.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::Config;
use crate::ctx::Ctx;
use crate::dispatcher::Dispatcher;
use crate::program_cache::ProgramCache;
use crate::reconciler::{Reconciler, ReconcilerConfig};
use crate::server;
use crate::store::{PgProgramStore, ProgramStore, TenantDirectory};
use crate::sweeper::{Sweeper, SweeperConfig};
use crate::trigger::ScheduledLauncher;
use crate::workforce::Workforce;

enum StoreSource {
    Database(String),
    Provided {
        directory: Arc<dyn TenantDirectory>,
        store: Arc<dyn ProgramStore>,
    },
}

/// Builder for creating a [`ManagerRuntime`].
pub struct ManagerRuntimeBuilder {
    bind_addr: SocketAddr,
    source: Option<StoreSource>,
    sweep_interval: Duration,
    reconcile_interval: Duration,
    worker_timeout: Duration,
}

impl Default for ManagerRuntimeBuilder {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            source: None,
            sweep_interval: Duration::from_secs(5),
            reconcile_interval: Duration::from_secs(60),
            worker_timeout: Duration::from_secs(15),
        }
    }
}

impl ManagerRuntimeBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder pre-filled from a loaded [`Config`].
    pub fn from_config(config: &Config) -> Self {
        Self::new()
            .bind_addr(config.http_addr)
            .database_url(&config.database_url)
            .sweep_interval(config.sweep_interval)
            .reconcile_interval(config.reconcile_interval)
            .worker_timeout(config.worker_timeout)
    }

    /// Set the HTTP listen address.
    ///
    /// Default: `0.0.0.0:8080`
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Read tenants from the PostgreSQL control database at `url`.
    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.source = Some(StoreSource::Database(url.into()));
        self
    }

    /// Use a custom tenant directory and program store.
    pub fn store<S>(mut self, store: Arc<S>) -> Self
    where
        S: TenantDirectory + ProgramStore + 'static,
    {
        self.source = Some(StoreSource::Provided {
            directory: store.clone(),
            store,
        });
        self
    }

    /// Set how often dead workers are evicted.
    ///
    /// Default: 5 seconds
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Set the time between reconciliation passes.
    ///
    /// Default: 60 seconds
    pub fn reconcile_interval(mut self, interval: Duration) -> Self {
        self.reconcile_interval = interval;
        self
    }

    /// Set how long a worker stays alive without a load report.
    ///
    /// Default: 15 seconds
    pub fn worker_timeout(mut self, timeout: Duration) -> Self {
        self.worker_timeout = timeout;
        self
    }

    /// Build the runtime configuration.
    pub fn build(self) -> Result<ManagerRuntimeConfig> {
        let source = self
            .source
            .ok_or_else(|| anyhow::anyhow!("either database_url or store is required"))?;
        if self.sweep_interval.is_zero() || self.reconcile_interval.is_zero() {
            anyhow::bail!("sweep and reconcile intervals must be greater than zero");
        }
        if self.worker_timeout.is_zero() {
            anyhow::bail!("worker_timeout must be greater than zero");
        }

        Ok(ManagerRuntimeConfig {
            bind_addr: self.bind_addr,
            source,
            sweep_interval: self.sweep_interval,
            reconcile_interval: self.reconcile_interval,
            worker_timeout: self.worker_timeout,
        })
    }
}

/// Configuration for a [`ManagerRuntime`].
pub struct ManagerRuntimeConfig {
    bind_addr: SocketAddr,
    source: StoreSource,
    sweep_interval: Duration,
    reconcile_interval: Duration,
    worker_timeout: Duration,
}

impl ManagerRuntimeConfig {
    /// Connect to the control database, bind the listener and spawn the
    /// background workers.
    pub async fn start(self) -> Result<ManagerRuntime> {
        let (directory, store): (Arc<dyn TenantDirectory>, Arc<dyn ProgramStore>) =
            match self.source {
                StoreSource::Database(url) => {
                    let pool = PgPoolOptions::new()
                        .max_connections(4)
                        .connect(&url)
                        .await?;
                    info!("Connected to control database");
                    let pg = Arc::new(PgProgramStore::new(pool));
                    let directory: Arc<dyn TenantDirectory> = pg.clone();
                    let store: Arc<dyn ProgramStore> = pg;
                    (directory, store)
                }
                StoreSource::Provided { directory, store } => (directory, store),
            };

        let workforce = Arc::new(Workforce::new(self.worker_timeout));
        let dispatcher = Arc::new(Dispatcher::new(workforce.clone()));
        let programs = Arc::new(ProgramCache::new(Arc::new(ScheduledLauncher::new(
            dispatcher.clone(),
        ))));

        let listener = TcpListener::bind(self.bind_addr).await?;
        let local_addr = listener.local_addr()?;

        let ctx = Ctx {
            workforce: workforce.clone(),
            programs: programs.clone(),
            dispatcher: dispatcher.clone(),
        };
        let (server_shutdown_tx, server_shutdown_rx) = watch::channel(false);
        let server_handle = tokio::spawn(server::serve(
            listener,
            server::router(ctx),
            server_shutdown_rx,
        ));

        let sweeper = Sweeper::new(
            workforce.clone(),
            SweeperConfig {
                interval: self.sweep_interval,
            },
        );
        let sweeper_shutdown = sweeper.shutdown_handle();
        let sweeper_handle = tokio::spawn(async move {
            sweeper.run().await;
        });

        let reconciler = Reconciler::new(
            directory,
            store,
            programs.clone(),
            ReconcilerConfig {
                interval: self.reconcile_interval,
            },
        );
        let reconciler_shutdown = reconciler.shutdown_handle();
        let reconciler_handle = tokio::spawn(async move {
            reconciler.run().await;
        });

        info!(addr = %local_addr, "ManagerRuntime started");

        Ok(ManagerRuntime {
            server_handle,
            server_shutdown_tx,
            workers: vec![
                ("sweeper", sweeper_handle, sweeper_shutdown),
                ("reconciler", reconciler_handle, reconciler_shutdown),
            ],
            workforce,
            programs,
            dispatcher,
            local_addr,
        })
    }
}

/// A running manager that can be embedded in an application.
///
/// Call [`shutdown`](Self::shutdown) for graceful termination.
pub struct ManagerRuntime {
    server_handle: JoinHandle<std::io::Result<()>>,
    server_shutdown_tx: watch::Sender<bool>,
    workers: Vec<(&'static str, JoinHandle<()>, Arc<Notify>)>,
    workforce: Arc<Workforce>,
    programs: Arc<ProgramCache>,
    dispatcher: Arc<Dispatcher>,
    local_addr: SocketAddr,
}

impl ManagerRuntime {
    /// Create a new builder for configuring the runtime.
    pub fn builder() -> ManagerRuntimeBuilder {
        ManagerRuntimeBuilder::new()
    }

    /// Address the HTTP server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The worker registry.
    pub fn workforce(&self) -> &Arc<Workforce> {
        &self.workforce
    }

    /// The scheduled routines.
    pub fn programs(&self) -> &Arc<ProgramCache> {
        &self.programs
    }

    /// The task dispatcher.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Gracefully shut down: stop triggers and loops, then the HTTP server.
    pub async fn shutdown(self) -> Result<()> {
        info!("ManagerRuntime shutting down...");

        for (_, _, shutdown) in &self.workers {
            shutdown.notify_one();
        }
        for (name, handle, _) in self.workers {
            if let Err(e) = handle.await {
                error!(worker = name, "Background task panicked: {}", e);
            }
        }
        // The reconciler stops triggers on exit; this covers a reconciler that panicked.
        self.programs.stop_all();

        let _ = self.server_shutdown_tx.send(true);
        match self.server_handle.await {
            Ok(Ok(())) => {
                info!("ManagerRuntime shutdown complete");
                Ok(())
            }
            Ok(Err(e)) => {
                error!("Manager server error during shutdown: {}", e);
                Err(e.into())
            }
            Err(e) => {
                error!("Manager server task panicked: {}", e);
                Err(anyhow::anyhow!("server task panicked: {}", e))
            }
        }
    }

    /// Check if the runtime is still running.
    pub fn is_running(&self) -> bool {
        !self.server_handle.is_finished()
            && self.workers.iter().all(|(_, handle, _)| !handle.is_finished())
    }
}
