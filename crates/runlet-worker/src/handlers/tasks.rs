// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Task submission handler

use axum::{
    Json,
    body::Body,
    extract::{State, rejection::JsonRejection},
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use runlet_protocol::{EXPIRES_HEADER, ProtocolError, Task, format_expires};
use runlet_sandbox::{CgiRequest, CgiResponse, SandboxError};
use tracing::warn;

use crate::{
    ctx::Ctx,
    execution_cache::TaskResult,
    handlers::error::{ErrorResponse, IntoErrorResponse},
};

/// Handler for the `POST /v1/tasks` endpoint
///
/// Compiles the task's program (or reuses the cached artifact) and runs it
/// before answering.
///
/// ## Response
/// - **200 OK**: plain task finished; empty body
/// - **CGI mode**: whatever status, headers and body the script produced
/// - **400 Bad Request**: undecodable JSON or base64
/// - **500 Internal Server Error**: compile, runtime or deadline error
///
/// Successful responses carry `X-Expires` with the expiry of the compiled
/// program on this worker.
///
/// ## Error Codes
/// - `INVALID_TASK`: the body is not a valid task
/// - `INVALID_PAYLOAD`: a base64 field could not be decoded
/// - sandbox codes such as `COMPILE_ERROR`, `IMPORT_NOT_ALLOWED`,
///   `RUNTIME_ERROR`, `DEADLINE_EXCEEDED`
#[tracing::instrument(skip_all, err)]
pub async fn handler(
    State(ctx): State<Ctx>,
    json: Result<Json<Task>, JsonRejection>,
) -> Result<Response, ErrorResponse> {
    let task = match json {
        Ok(Json(task)) => task,
        Err(err) => {
            tracing::debug!(error = ?err, "invalid task body");
            return Err(Error::InvalidBody(err).into());
        }
    };

    let request = task
        .http
        .as_ref()
        .map(CgiRequest::from_payload)
        .transpose()
        .map_err(Error::InvalidPayload)?;

    let (result, expires_at) = ctx
        .executions
        .execute(&task, request)
        .await
        .map_err(|err| {
            tracing::debug!(program = %task.program_key(), error = %err, "task failed");
            Error::Sandbox(err)
        })?;

    let mut response = match result {
        TaskResult::Plain(_) => StatusCode::OK.into_response(),
        TaskResult::Http(cgi) => cgi_response(cgi),
    };
    set_expires(&mut response, expires_at);
    Ok(response)
}

fn cgi_response(cgi: CgiResponse) -> Response {
    let status = StatusCode::from_u16(cgi.status).unwrap_or(StatusCode::OK);
    let mut response = Response::new(Body::from(cgi.body));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    for (name, value) in cgi.headers {
        match (
            HeaderName::try_from(name.as_str()),
            HeaderValue::try_from(value.as_str()),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!(header = %name, "Dropping invalid header set by script"),
        }
    }
    response
}

fn set_expires(response: &mut Response, at: DateTime<Utc>) {
    if let (Ok(name), Ok(value)) = (
        HeaderName::from_bytes(EXPIRES_HEADER.as_bytes()),
        HeaderValue::try_from(format_expires(at)),
    ) {
        response.headers_mut().insert(name, value);
    }
}

/// Errors that can occur while handling a task
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The body is not a valid task
    #[error("invalid task: {0}")]
    InvalidBody(#[source] JsonRejection),

    /// A base64 field of the task could not be decoded
    #[error("invalid payload: {0}")]
    InvalidPayload(#[source] ProtocolError),

    /// The sandbox rejected or failed the program
    #[error(transparent)]
    Sandbox(SandboxError),
}

impl IntoErrorResponse for Error {
    fn error_code(&self) -> &'static str {
        match self {
            Error::InvalidBody(_) => "INVALID_TASK",
            Error::InvalidPayload(_) => "INVALID_PAYLOAD",
            Error::Sandbox(err) => err.error_code(),
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidBody(_) | Error::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            Error::Sandbox(err) if err.is_client_error() => StatusCode::BAD_REQUEST,
            Error::Sandbox(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
