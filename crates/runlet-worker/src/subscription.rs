// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Registration of this worker with the manager.
//!
//! [`LoadReporter`] subscribes on start, reports the execution cache load on a
//! fixed cadence and unsubscribes on shutdown. A load report answered with
//! `404` means the manager no longer knows this worker (it restarted or
//! swept us), so the reporter subscribes again.

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use runlet_protocol::{LoadReport, Subscription};
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::execution_cache::ExecutionCache;

/// Errors talking to the manager.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The manager could not be reached.
    #[error("manager unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    /// The manager answered with an unexpected status.
    #[error("manager returned status {0}")]
    UnexpectedStatus(u16),

    /// The manager does not know this worker.
    #[error("worker is not subscribed")]
    UnknownSubscriber,
}

/// HTTP client for the manager's subscriber API.
#[derive(Debug, Clone)]
pub struct ManagerClient {
    http: reqwest::Client,
    base_url: String,
}

impl ManagerClient {
    /// Create a client for the manager at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// `POST /v1/subscribers`.
    pub async fn subscribe(&self, subscription: &Subscription) -> Result<(), ClientError> {
        let response = self
            .http
            .post(format!("{}/v1/subscribers", self.base_url))
            .json(subscription)
            .send()
            .await?;
        match response.status() {
            StatusCode::CREATED | StatusCode::OK | StatusCode::NO_CONTENT => Ok(()),
            status => Err(ClientError::UnexpectedStatus(status.as_u16())),
        }
    }

    /// `PUT /v1/subscribers/{id}/load`.
    pub async fn report_load(&self, id: &str, load: u64) -> Result<(), ClientError> {
        let response = self
            .http
            .put(format!("{}/v1/subscribers/{}/load", self.base_url, id))
            .json(&LoadReport { load })
            .send()
            .await?;
        match response.status() {
            StatusCode::NO_CONTENT | StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => Err(ClientError::UnknownSubscriber),
            status => Err(ClientError::UnexpectedStatus(status.as_u16())),
        }
    }

    /// `DELETE /v1/subscribers/{id}`.
    pub async fn unsubscribe(&self, id: &str) -> Result<(), ClientError> {
        let response = self
            .http
            .delete(format!("{}/v1/subscribers/{}", self.base_url, id))
            .send()
            .await?;
        match response.status() {
            StatusCode::NO_CONTENT | StatusCode::OK | StatusCode::NOT_FOUND => Ok(()),
            status => Err(ClientError::UnexpectedStatus(status.as_u16())),
        }
    }
}

/// Configuration for the load reporter.
#[derive(Debug, Clone)]
pub struct LoadReporterConfig {
    /// How often to report load.
    pub interval: Duration,
}

impl Default for LoadReporterConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
        }
    }
}

/// Background task keeping this worker registered with the manager.
pub struct LoadReporter {
    client: ManagerClient,
    subscription: Subscription,
    executions: Arc<ExecutionCache>,
    config: LoadReporterConfig,
    shutdown: Arc<Notify>,
}

impl LoadReporter {
    /// Create a reporter.
    pub fn new(
        client: ManagerClient,
        subscription: Subscription,
        executions: Arc<ExecutionCache>,
        config: LoadReporterConfig,
    ) -> Self {
        Self {
            client,
            subscription,
            executions,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Get a handle that can be used to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Run until shutdown, then unsubscribe.
    pub async fn run(&self) {
        info!(
            worker_id = %self.subscription.uuid,
            uri = %self.subscription.base_uri(),
            interval_secs = self.config.interval.as_secs(),
            "Load reporter started"
        );

        let mut subscribed = self.subscribe().await;

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("Load reporter received shutdown signal");
                    break;
                }

                _ = tokio::time::sleep(self.config.interval) => {
                    if !subscribed {
                        subscribed = self.subscribe().await;
                        continue;
                    }
                    subscribed = self.report().await;
                }
            }
        }

        if let Err(e) = self.client.unsubscribe(&self.subscription.uuid).await {
            warn!(error = %e, "Failed to unsubscribe from manager");
        }
        info!("Load reporter stopped");
    }

    async fn subscribe(&self) -> bool {
        match self.client.subscribe(&self.subscription).await {
            Ok(()) => {
                info!(worker_id = %self.subscription.uuid, "Subscribed to manager");
                true
            }
            Err(e) => {
                error!(error = %e, "Failed to subscribe to manager");
                false
            }
        }
    }

    /// Report load once. Returns whether the worker is still subscribed.
    async fn report(&self) -> bool {
        let load = self.executions.load();
        match self.client.report_load(&self.subscription.uuid, load).await {
            Ok(()) => {
                debug!(load, "Load reported");
                true
            }
            Err(ClientError::UnknownSubscriber) => {
                warn!("Manager no longer knows this worker; re-subscribing");
                self.subscribe().await
            }
            Err(e) => {
                warn!(error = %e, "Failed to report load");
                true
            }
        }
    }
}
