// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Subscriber delete handler

use axum::{
    extract::{Path, State, rejection::PathRejection},
    http::StatusCode,
};

use crate::{
    ctx::Ctx,
    handlers::error::{ErrorResponse, IntoErrorResponse},
};

/// Handler for the `DELETE /v1/subscribers/{id}` endpoint
///
/// Removes a worker. Unknown ids are accepted so that unsubscribing is
/// idempotent.
///
/// ## Response
/// - **204 No Content**: worker removed (or was not registered)
/// - **400 Bad Request**: invalid path
#[tracing::instrument(skip_all, err)]
pub async fn handler(
    State(ctx): State<Ctx>,
    path: Result<Path<String>, PathRejection>,
) -> Result<StatusCode, ErrorResponse> {
    let id = match path {
        Ok(Path(id)) => id,
        Err(err) => {
            tracing::debug!(error = %err, "invalid subscriber id in path");
            return Err(Error::InvalidId { err }.into());
        }
    };

    match ctx.workforce.unregister(&id) {
        Some(worker) => tracing::info!(worker_id = %worker.id, "Worker unsubscribed"),
        None => tracing::debug!(worker_id = %id, "Unsubscribe for unknown worker"),
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Errors that can occur during unsubscription
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The path could not be parsed
    #[error("invalid subscriber id: {err}")]
    InvalidId {
        /// The rejection details from Axum's path extractor
        err: PathRejection,
    },
}

impl IntoErrorResponse for Error {
    fn error_code(&self) -> &'static str {
        match self {
            Error::InvalidId { .. } => "INVALID_SUBSCRIBER_ID",
        }
    }

    fn status_code(&self) -> StatusCode {
        StatusCode::BAD_REQUEST
    }
}
