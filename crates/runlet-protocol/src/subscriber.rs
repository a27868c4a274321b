// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

use serde::{Deserialize, Serialize};

/// Body of `POST /v1/subscribers`, sent by a worker announcing itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Worker identity, chosen by the worker (usually a UUID).
    pub uuid: String,
    /// URI scheme the worker is reachable on (`http` or `https`).
    pub scheme: String,
    /// URI authority. May embed single-use credentials (`user:token@host:port`).
    pub authority: String,
    /// Script languages the worker can compile.
    #[serde(default)]
    pub languages: Vec<String>,
}

impl Subscription {
    /// Base URI of the worker (`scheme://authority`).
    pub fn base_uri(&self) -> String {
        format!("{}://{}", self.scheme, self.authority)
    }
}

/// Body of `PUT /v1/subscribers/{id}/load`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadReport {
    /// Current load; lower means more available.
    pub load: u64,
}
