// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP server of the worker.

use axum::{
    Router,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use crate::ctx::Ctx;
use crate::handlers::{health, tasks};

/// Build the worker router.
pub fn router(ctx: Ctx) -> Router {
    Router::new()
        .route("/v1/tasks", post(tasks::handler))
        .route("/health", get(health::handler))
        .with_state(ctx)
}

/// Serve `router` on `listener` until `shutdown_rx` flips to `true`.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    mut shutdown_rx: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    info!(addr = %addr, "Worker HTTP server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            while !*shutdown_rx.borrow_and_update() {
                if shutdown_rx.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
}
