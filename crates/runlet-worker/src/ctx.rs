// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Service context

use std::sync::Arc;

use crate::execution_cache::ExecutionCache;

/// State shared by the worker's handlers.
#[derive(Clone)]
pub struct Ctx {
    /// Subscription id of this worker.
    pub worker_id: Arc<str>,
    /// Compiled-program cache and engine.
    pub executions: Arc<ExecutionCache>,
}
