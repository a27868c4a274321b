// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

use axum::{Json, extract::State};
use serde::Serialize;

use crate::{ctx::Ctx, dispatcher::DispatchStats};

/// Health check handler (`GET /health`)
pub async fn handler(State(ctx): State<Ctx>) -> Json<HealthResponse> {
    let workers = ctx.workforce.list();
    Json(HealthResponse {
        status: "ok",
        workers: workers.len(),
        alive_workers: workers.iter().filter(|w| w.is_alive()).count(),
        routines: ctx.programs.len(),
        dispatch: ctx.dispatcher.stats(),
    })
}

/// Body of the health endpoint.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `ok` while the server answers.
    pub status: &'static str,
    /// Registered workers.
    pub workers: usize,
    /// Registered workers within their timeout.
    pub alive_workers: usize,
    /// Scheduled routines.
    pub routines: usize,
    /// Dispatch counters.
    pub dispatch: DispatchStats,
}
