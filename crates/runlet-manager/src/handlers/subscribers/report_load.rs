// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Subscriber load report handler

use axum::{
    Json,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
};
use runlet_protocol::LoadReport;

use crate::{
    ctx::Ctx,
    handlers::error::{ErrorResponse, IntoErrorResponse},
};

/// Handler for the `PUT /v1/subscribers/{id}/load` endpoint
///
/// Records the worker's load and refreshes its liveness.
///
/// ## Request Body
/// - `load`: sum of the deadlines (ms) of the worker's cached programs
///
/// ## Response
/// - **204 No Content**: load recorded
/// - **400 Bad Request**: invalid path or body
/// - **404 Not Found**: unknown worker; it should subscribe again
///
/// ## Error Codes
/// - `INVALID_SUBSCRIBER_ID`: invalid path
/// - `INVALID_REQUEST_BODY`: malformed JSON body
/// - `SUBSCRIBER_NOT_FOUND`: unknown worker
#[tracing::instrument(skip_all, err)]
pub async fn handler(
    State(ctx): State<Ctx>,
    path: Result<Path<String>, PathRejection>,
    body: Result<Json<LoadReport>, JsonRejection>,
) -> Result<StatusCode, ErrorResponse> {
    let id = match path {
        Ok(Path(id)) => id,
        Err(err) => {
            tracing::debug!(error = %err, "invalid subscriber id in path");
            return Err(Error::InvalidId { err }.into());
        }
    };
    let report = match body {
        Ok(Json(report)) => report,
        Err(err) => {
            tracing::debug!(error = %err, "invalid JSON in request body");
            return Err(Error::InvalidRequestBody { err }.into());
        }
    };

    if !ctx.workforce.report_load(&id, report.load) {
        return Err(Error::NotFound { id }.into());
    }
    tracing::trace!(worker_id = %id, load = report.load, "Load reported");

    Ok(StatusCode::NO_CONTENT)
}

/// Errors that can occur when recording load
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The path could not be parsed
    #[error("invalid subscriber id: {err}")]
    InvalidId {
        /// The rejection details from Axum's path extractor
        err: PathRejection,
    },

    /// The JSON request body is malformed or invalid
    #[error("invalid request body: {err}")]
    InvalidRequestBody {
        /// The rejection details from Axum's JSON extractor
        err: JsonRejection,
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
            Error::InvalidRequestBody { .. } => "INVALID_REQUEST_BODY",
            Error::NotFound { .. } => "SUBSCRIBER_NOT_FOUND",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidId { .. } | Error::InvalidRequestBody { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
        }
    }
}
