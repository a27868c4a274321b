// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable runtime for runlet-worker.
//!
//! ```rust,ignore
//! use runlet_worker::runtime::WorkerRuntime;
//!
//! let runtime = WorkerRuntime::builder()
//!     .bind_addr("0.0.0.0:8090".parse()?)
//!     .authority("worker-1.internal:8090")
//!     .manager_url("http://manager:8080")
//!     .library_url("http://library:8070")
//!     .build()?
//!     .start()
//!     .await?;
//!
//! // ... serve tasks ...
//!
//! runtime.shutdown().await?;
//! ```
//!
//! Without a manager URL the worker only serves tasks and never subscribes.
//! Without a library URL (or explicit resolver) named imports fail to compile.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use runlet_protocol::Subscription;
use runlet_sandbox::{Engine, EngineConfig, LUA, ModuleResolver, NoResolver};
use tokio::net::TcpListener;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::Config;
use crate::ctx::Ctx;
use crate::execution_cache::ExecutionCache;
use crate::module_cache::{LibraryClient, ModuleCache};
use crate::server;
use crate::subscription::{LoadReporter, LoadReporterConfig, ManagerClient};

/// Builder for creating a [`WorkerRuntime`].
pub struct WorkerRuntimeBuilder {
    bind_addr: SocketAddr,
    worker_id: Option<String>,
    scheme: String,
    authority: Option<String>,
    manager_url: Option<String>,
    library_url: Option<String>,
    resolver: Option<Arc<dyn ModuleResolver>>,
    program_ttl: Duration,
    module_ttl: Duration,
    load_report_interval: Duration,
    engine_config: EngineConfig,
}

impl Default for WorkerRuntimeBuilder {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8090)),
            worker_id: None,
            scheme: "http".to_string(),
            authority: None,
            manager_url: None,
            library_url: None,
            resolver: None,
            program_ttl: Duration::from_secs(300),
            module_ttl: Duration::from_secs(600),
            load_report_interval: Duration::from_secs(5),
            engine_config: EngineConfig::default(),
        }
    }
}

impl WorkerRuntimeBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder pre-filled from a loaded [`Config`].
    pub fn from_config(config: &Config) -> Self {
        Self::new()
            .bind_addr(config.http_addr)
            .worker_id(&config.worker_id)
            .scheme(&config.scheme)
            .authority(&config.authority)
            .manager_url(&config.manager_url)
            .library_url(&config.library_url)
            .program_ttl(config.program_ttl)
            .module_ttl(config.module_ttl)
            .load_report_interval(config.load_report_interval)
            .memory_limit(config.memory_limit)
    }

    /// Set the HTTP listen address.
    ///
    /// Default: `0.0.0.0:8090`
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the subscription id. Default: a random UUID.
    pub fn worker_id(mut self, id: impl Into<String>) -> Self {
        self.worker_id = Some(id.into());
        self
    }

    /// Set the scheme announced to the manager.
    ///
    /// Default: `http`
    pub fn scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// Set the authority announced to the manager.
    ///
    /// Default: the bound local address
    pub fn authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = Some(authority.into());
        self
    }

    /// Set the manager base URL. Enables subscription and load reports.
    pub fn manager_url(mut self, url: impl Into<String>) -> Self {
        self.manager_url = Some(url.into());
        self
    }

    /// Set the module index base URL.
    pub fn library_url(mut self, url: impl Into<String>) -> Self {
        self.library_url = Some(url.into());
        self
    }

    /// Use a custom upstream module resolver instead of the module index.
    pub fn resolver(mut self, resolver: Arc<dyn ModuleResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Set the compiled-program lifetime. Zero disables caching.
    ///
    /// Default: 5 minutes
    pub fn program_ttl(mut self, ttl: Duration) -> Self {
        self.program_ttl = ttl;
        self
    }

    /// Set the module lifetime.
    ///
    /// Default: 10 minutes
    pub fn module_ttl(mut self, ttl: Duration) -> Self {
        self.module_ttl = ttl;
        self
    }

    /// Set the load report cadence.
    ///
    /// Default: 5 seconds
    pub fn load_report_interval(mut self, interval: Duration) -> Self {
        self.load_report_interval = interval;
        self
    }

    /// Set the memory cap of one script run, in bytes.
    ///
    /// Default: 64 MiB
    pub fn memory_limit(mut self, bytes: usize) -> Self {
        self.engine_config.memory_limit = bytes;
        self
    }

    /// Build the runtime configuration.
    pub fn build(self) -> Result<WorkerRuntimeConfig> {
        if self.scheme != "http" && self.scheme != "https" {
            anyhow::bail!("scheme must be http or https, got '{}'", self.scheme);
        }
        if self.load_report_interval.is_zero() {
            anyhow::bail!("load_report_interval must be greater than zero");
        }

        let upstream: Arc<dyn ModuleResolver> = match (self.resolver, self.library_url) {
            (Some(resolver), _) => resolver,
            (None, Some(url)) => Arc::new(LibraryClient::new(url)),
            (None, None) => Arc::new(NoResolver),
        };

        Ok(WorkerRuntimeConfig {
            bind_addr: self.bind_addr,
            worker_id: self
                .worker_id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            scheme: self.scheme,
            authority: self.authority,
            manager_url: self.manager_url,
            upstream,
            program_ttl: self.program_ttl,
            module_ttl: self.module_ttl,
            load_report_interval: self.load_report_interval,
            engine_config: self.engine_config,
        })
    }
}

/// Configuration for a [`WorkerRuntime`].
pub struct WorkerRuntimeConfig {
    bind_addr: SocketAddr,
    worker_id: String,
    scheme: String,
    authority: Option<String>,
    manager_url: Option<String>,
    upstream: Arc<dyn ModuleResolver>,
    program_ttl: Duration,
    module_ttl: Duration,
    load_report_interval: Duration,
    engine_config: EngineConfig,
}

impl WorkerRuntimeConfig {
    /// Bind the listener and spawn the HTTP server and load reporter.
    pub async fn start(self) -> Result<WorkerRuntime> {
        let modules = Arc::new(ModuleCache::new(self.upstream, self.module_ttl));
        let engine = Arc::new(Engine::with_config(modules, self.engine_config));
        let executions = Arc::new(ExecutionCache::new(engine, self.program_ttl));

        let listener = TcpListener::bind(self.bind_addr).await?;
        let local_addr = listener.local_addr()?;

        let ctx = Ctx {
            worker_id: Arc::from(self.worker_id.as_str()),
            executions: executions.clone(),
        };
        let (server_shutdown_tx, server_shutdown_rx) = watch::channel(false);
        let server_handle = tokio::spawn(server::serve(
            listener,
            server::router(ctx),
            server_shutdown_rx,
        ));

        let reporter = match self.manager_url {
            Some(manager_url) => {
                let subscription = Subscription {
                    uuid: self.worker_id.clone(),
                    scheme: self.scheme.clone(),
                    authority: self
                        .authority
                        .clone()
                        .unwrap_or_else(|| local_addr.to_string()),
                    languages: vec![LUA.to_string()],
                };
                let reporter = LoadReporter::new(
                    ManagerClient::new(manager_url),
                    subscription,
                    executions.clone(),
                    LoadReporterConfig {
                        interval: self.load_report_interval,
                    },
                );
                let shutdown = reporter.shutdown_handle();
                let handle = tokio::spawn(async move {
                    reporter.run().await;
                });
                Some((handle, shutdown))
            }
            None => None,
        };

        info!(
            addr = %local_addr,
            worker_id = %self.worker_id,
            subscribed = reporter.is_some(),
            "WorkerRuntime started"
        );

        Ok(WorkerRuntime {
            server_handle,
            server_shutdown_tx,
            reporter,
            executions,
            local_addr,
            worker_id: self.worker_id,
        })
    }
}

/// A running worker that can be embedded in an application.
///
/// Call [`shutdown`](Self::shutdown) for graceful termination.
pub struct WorkerRuntime {
    server_handle: JoinHandle<std::io::Result<()>>,
    server_shutdown_tx: watch::Sender<bool>,
    reporter: Option<(JoinHandle<()>, Arc<Notify>)>,
    executions: Arc<ExecutionCache>,
    local_addr: SocketAddr,
    worker_id: String,
}

impl WorkerRuntime {
    /// Create a new builder for configuring the runtime.
    pub fn builder() -> WorkerRuntimeBuilder {
        WorkerRuntimeBuilder::new()
    }

    /// Address the HTTP server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Subscription id of this worker.
    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// The compiled-program cache.
    pub fn executions(&self) -> &Arc<ExecutionCache> {
        &self.executions
    }

    /// Gracefully shut down: unsubscribe, then stop the HTTP server.
    pub async fn shutdown(self) -> Result<()> {
        info!("WorkerRuntime shutting down...");

        if let Some((handle, shutdown)) = self.reporter {
            shutdown.notify_one();
            if let Err(e) = handle.await {
                error!("Load reporter task panicked: {}", e);
            }
        }

        let _ = self.server_shutdown_tx.send(true);
        match self.server_handle.await {
            Ok(Ok(())) => {
                self.executions.clear();
                info!("WorkerRuntime shutdown complete");
                Ok(())
            }
            Ok(Err(e)) => {
                error!("Worker server error during shutdown: {}", e);
                Err(e.into())
            }
            Err(e) => {
                error!("Worker server task panicked: {}", e);
                Err(anyhow::anyhow!("server task panicked: {}", e))
            }
        }
    }

    /// Check if the runtime is still running.
    pub fn is_running(&self) -> bool {
        !self.server_handle.is_finished()
            && self
                .reporter
                .as_ref()
                .is_none_or(|(handle, _)| !handle.is_finished())
    }
}
