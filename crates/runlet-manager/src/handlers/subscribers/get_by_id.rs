// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Subscriber existence check handler

use axum::{
    extract::{Path, State, rejection::PathRejection},
    http::StatusCode,
};

use crate::{
    ctx::Ctx,
    handlers::error::{ErrorResponse, IntoErrorResponse},
};

/// Handler for the `GET /v1/subscribers/{id}` endpoint
///
/// ## Response
/// - **204 No Content**: the worker is registered
/// - **404 Not Found**: no worker with this id
///
/// ## Error Codes
/// - `INVALID_SUBSCRIBER_ID`: invalid path
/// - `SUBSCRIBER_NOT_FOUND`: unknown worker
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

    if ctx.workforce.exists(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::NotFound { id }.into())
    }
}

/// Errors that can occur when looking up a subscriber
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The path could not be parsed
    #[error("invalid subscriber id: {err}")]
    InvalidId {
        /// The rejection details from Axum's path extractor
        err: PathRejection,
    },

    /// No worker with this id
    #[error("subscriber '{id}' not found")]
    NotFound {
        /// The requested id
        id: String,
    },
}

impl IntoErrorResponse for Error {
    fn error_code(&self) -> &'static str {
        match self {
            Error::InvalidId { .. } => "INVALID_SUBSCRIBER_ID",
            Error::NotFound { .. } => "SUBSCRIBER_NOT_FOUND",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidId { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
        }
    }
}
