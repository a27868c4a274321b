// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Subscriber create handler

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};
use runlet_protocol::Subscription;

use crate::{
    ctx::Ctx,
    handlers::error::{ErrorResponse, IntoErrorResponse},
};

/// Handler for the `POST /v1/subscribers` endpoint
///
/// Registers a worker, replacing any worker with the same id.
///
/// ## Request Body
/// - `uuid`: worker id
/// - `scheme`: `http` or `https`
/// - `authority`: host and port the manager dispatches to
/// - `languages`: accepted languages (optional, empty means any)
///
/// ## Response
/// - **201 Created**: worker registered
/// - **400 Bad Request**: invalid body
///
/// ## Error Codes
/// - `INVALID_REQUEST_BODY`: malformed JSON body
/// - `INVALID_SUBSCRIPTION`: empty id or authority, or unsupported scheme
#[tracing::instrument(skip_all, err)]
pub async fn handler(
    State(ctx): State<Ctx>,
    body: Result<Json<Subscription>, JsonRejection>,
) -> Result<StatusCode, ErrorResponse> {
    let subscription = match body {
        Ok(Json(subscription)) => subscription,
        Err(err) => {
            tracing::debug!(error = %err, "invalid JSON in request body");
            return Err(Error::InvalidRequestBody { err }.into());
        }
    };

    validate(&subscription)?;

    let worker = ctx.workforce.subscribe(subscription);
    tracing::info!(
        worker_id = %worker.id,
        uri = %worker.base_uri(),
        languages = ?worker.languages,
        "Worker subscribed"
    );

    Ok(StatusCode::CREATED)
}

fn validate(subscription: &Subscription) -> Result<(), Error> {
    if subscription.uuid.trim().is_empty() {
        return Err(Error::InvalidSubscription("uuid must not be empty"));
    }
    if subscription.authority.trim().is_empty() {
        return Err(Error::InvalidSubscription("authority must not be empty"));
    }
    if subscription.scheme != "http" && subscription.scheme != "https" {
        return Err(Error::InvalidSubscription("scheme must be http or https"));
    }
    Ok(())
}

/// Errors that can occur during subscription
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The JSON request body is malformed or invalid
    #[error("invalid request body: {err}")]
    InvalidRequestBody {
        /// The rejection details from Axum's JSON extractor
        err: JsonRejection,
    },

    /// The subscription is well-formed JSON but unusable
    #[error("invalid subscription: {0}")]
    InvalidSubscription(&'static str),
}

impl IntoErrorResponse for Error {
    fn error_code(&self) -> &'static str {
        match self {
            Error::InvalidRequestBody { .. } => "INVALID_REQUEST_BODY",
            Error::InvalidSubscription(_) => "INVALID_SUBSCRIPTION",
        }
    }

    fn status_code(&self) -> StatusCode {
        StatusCode::BAD_REQUEST
    }
}
