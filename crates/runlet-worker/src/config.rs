// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for runlet-worker.

use std::net::SocketAddr;
use std::time::Duration;

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listen address for the task endpoint
    pub http_addr: SocketAddr,
    /// Subscription id announced to the manager
    pub worker_id: String,
    /// Scheme the manager should use to reach this worker
    pub scheme: String,
    /// Authority the manager should use to reach this worker
    pub authority: String,
    /// Base URL of the manager
    pub manager_url: String,
    /// Base URL of the module index
    pub library_url: String,
    /// Lifetime of compiled programs (zero disables caching)
    pub program_ttl: Duration,
    /// Lifetime of fetched modules
    pub module_ttl: Duration,
    /// Load report cadence
    pub load_report_interval: Duration,
    /// Memory cap of one script run, in bytes
    pub memory_limit: usize,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let port: u16 = std::env::var("RUNLET_WORKER_PORT")
            .unwrap_or_else(|_| "8090".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;
        let http_addr = SocketAddr::from(([0, 0, 0, 0], port));

        let worker_id = std::env::var("RUNLET_WORKER_ID")
            .unwrap_or_else(|_| uuid::Uuid::new_v4().to_string());

        let scheme = std::env::var("RUNLET_WORKER_SCHEME").unwrap_or_else(|_| "http".to_string());
        if scheme != "http" && scheme != "https" {
            return Err(ConfigError::InvalidValue("RUNLET_WORKER_SCHEME"));
        }

        let authority = std::env::var("RUNLET_WORKER_AUTHORITY")
            .map_err(|_| ConfigError::MissingEnvVar("RUNLET_WORKER_AUTHORITY"))?;
        let manager_url = std::env::var("RUNLET_MANAGER_URL")
            .map_err(|_| ConfigError::MissingEnvVar("RUNLET_MANAGER_URL"))?;
        let library_url = std::env::var("RUNLET_LIBRARY_URL")
            .map_err(|_| ConfigError::MissingEnvVar("RUNLET_LIBRARY_URL"))?;

        let program_ttl = secs("RUNLET_PROGRAM_TTL_SECS", 300)?;
        let module_ttl = secs("RUNLET_MODULE_TTL_SECS", 600)?;
        let load_report_interval = secs("RUNLET_LOAD_REPORT_INTERVAL_SECS", 5)?;
        if load_report_interval.is_zero() {
            return Err(ConfigError::InvalidValue("RUNLET_LOAD_REPORT_INTERVAL_SECS"));
        }

        let memory_limit_mb: usize = std::env::var("RUNLET_MEMORY_LIMIT_MB")
            .unwrap_or_else(|_| "64".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("RUNLET_MEMORY_LIMIT_MB"))?;

        Ok(Self {
            http_addr,
            worker_id,
            scheme,
            authority,
            manager_url,
            library_url,
            program_ttl,
            module_ttl,
            load_report_interval,
            memory_limit: memory_limit_mb * 1024 * 1024,
        })
    }
}

fn secs(var: &'static str, default: u64) -> Result<Duration, ConfigError> {
    match std::env::var(var) {
        Ok(v) => v
            .parse()
            .map(Duration::from_secs)
            .map_err(|_| ConfigError::InvalidValue(var)),
        Err(_) => Ok(Duration::from_secs(default)),
    }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secs_default() {
        assert_eq!(
            secs("RUNLET_TEST_UNSET_VARIABLE", 42).unwrap(),
            Duration::from_secs(42)
        );
    }

    #[test]
    fn test_config_error_messages() {
        assert_eq!(
            ConfigError::MissingEnvVar("RUNLET_MANAGER_URL").to_string(),
            "Missing required environment variable: RUNLET_MANAGER_URL"
        );
        assert_eq!(
            ConfigError::InvalidValue("RUNLET_MEMORY_LIMIT_MB").to_string(),
            "Invalid value for RUNLET_MEMORY_LIMIT_MB"
        );
    }
}
