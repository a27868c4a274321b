// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for runlet-manager.

use thiserror::Error;

/// Manager errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Reading tenant data failed.
    #[error("Store error: {0}")]
    Store(#[from] crate::store::StoreError),

    /// The reconciliation protocol was misused.
    #[error("Reconcile error: {0}")]
    Reconcile(#[from] crate::program_cache::ReconcileError),
}

/// Result type using the manager [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
