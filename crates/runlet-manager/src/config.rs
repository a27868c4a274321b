// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for runlet-manager.

use std::net::SocketAddr;
use std::time::Duration;

/// Manager configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listen address for the subscriber API
    pub http_addr: SocketAddr,
    /// Control database listing tenants
    pub database_url: String,
    /// How often dead workers are evicted
    pub sweep_interval: Duration,
    /// Time between reconciliation passes
    pub reconcile_interval: Duration,
    /// How long a worker stays alive without a load report
    pub worker_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let port: u16 = std::env::var("RUNLET_MANAGER_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;
        let http_addr = SocketAddr::from(([0, 0, 0, 0], port));

        let database_url = std::env::var("RUNLET_DATABASE_URL")
            .map_err(|_| ConfigError::MissingEnvVar("RUNLET_DATABASE_URL"))?;

        let sweep_interval = positive_secs("RUNLET_SWEEP_INTERVAL_SECS", 5)?;
        let reconcile_interval = positive_secs("RUNLET_RECONCILE_INTERVAL_SECS", 60)?;
        let worker_timeout = positive_secs("RUNLET_WORKER_TIMEOUT_SECS", 15)?;

        Ok(Self {
            http_addr,
            database_url,
            sweep_interval,
            reconcile_interval,
            worker_timeout,
        })
    }
}

fn positive_secs(var: &'static str, default: u64) -> Result<Duration, ConfigError> {
    let secs = match std::env::var(var) {
        Ok(v) => v.parse().map_err(|_| ConfigError::InvalidValue(var))?,
        Err(_) => default,
    };
    if secs == 0 {
        return Err(ConfigError::InvalidValue(var));
    }
    Ok(Duration::from_secs(secs))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),
    /// The port number is invalid.
    #[error("Invalid port number")]
    InvalidPort,
    /// A variable has an unusable value.
    #[error("Invalid value for {0}")]
    InvalidValue(&'static str),
}
