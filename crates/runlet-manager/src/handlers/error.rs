// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error handling types for HTTP handlers

use axum::{Json, http::StatusCode};
use runlet_protocol::ErrorBody;

/// Error response returned by the manager API.
///
/// Rendered as `{code, message}`. Codes are SCREAMING_SNAKE_CASE and stable;
/// messages are for humans.
#[derive(Debug)]
pub struct ErrorResponse {
    /// HTTP status code for this error
    pub status_code: StatusCode,
    /// Wire body
    pub body: ErrorBody,
}

/// Implemented by every handler-specific error enum.
pub trait IntoErrorResponse: std::fmt::Display + Send + Sync + 'static {
    /// Stable, machine-readable error code.
    fn error_code(&self) -> &'static str;

    /// HTTP status code for this error.
    fn status_code(&self) -> StatusCode;
}

impl<E> From<E> for ErrorResponse
where
    E: IntoErrorResponse,
{
    fn from(error: E) -> Self {
        ErrorResponse {
            status_code: error.status_code(),
            body: ErrorBody::new(error.error_code(), error.to_string()),
        }
    }
}

impl std::fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.body.message.fmt(f)
    }
}

impl axum::response::IntoResponse for ErrorResponse {
    fn into_response(self) -> axum::response::Response {
        (self.status_code, Json(self.body)).into_response()
    }
}
