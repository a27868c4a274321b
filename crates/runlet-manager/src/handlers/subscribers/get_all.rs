// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Subscribers list handler

use axum::{Json, extract::State};

use super::subscriber_info::SubscriberInfo;
use crate::ctx::Ctx;

/// Handler for the `GET /v1/subscribers` endpoint
///
/// Lists every registered worker, alive or not, ordered by id.
#[tracing::instrument(skip_all)]
pub async fn handler(State(ctx): State<Ctx>) -> Json<Vec<SubscriberInfo>> {
    let mut subscribers: Vec<SubscriberInfo> = ctx
        .workforce
        .list()
        .iter()
        .map(SubscriberInfo::from)
        .collect();
    subscribers.sort_by(|a, b| a.uuid.cmp(&b.uuid));
    Json(subscribers)
}
