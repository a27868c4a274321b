// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

use axum::{Json, extract::State};
use serde::Serialize;

use crate::{ctx::Ctx, execution_cache::ExecutionStats};

/// Health check handler (`GET /health`)
pub async fn handler(State(ctx): State<Ctx>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        worker_id: ctx.worker_id.to_string(),
        load: ctx.executions.load(),
        stats: ctx.executions.stats(),
    })
}

/// Body of the health endpoint.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `ok` while the server answers.
    pub status: &'static str,
    /// This worker's subscription id.
    pub worker_id: String,
    /// Load reported to the manager.
    pub load: u64,
    /// Execution counters.
    pub stats: ExecutionStats,
}
