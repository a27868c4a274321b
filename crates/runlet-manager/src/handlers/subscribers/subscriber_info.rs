// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

use serde::{Deserialize, Serialize};

use crate::workforce::Worker;

/// Worker as listed by the subscriber API.
///
/// The authority is not included since it may embed credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberInfo {
    /// Worker id
    pub uuid: String,
    /// `http` or `https`
    pub scheme: String,
    /// Accepted languages
    pub languages: Vec<String>,
    /// Last reported load
    pub load: u64,
    /// Whether the worker reported within its timeout
    pub alive: bool,
    /// Milliseconds since the last report
    pub last_seen_ms: u64,
}

impl From<&Worker> for SubscriberInfo {
    fn from(worker: &Worker) -> Self {
        Self {
            uuid: worker.id.clone(),
            scheme: worker.scheme.clone(),
            languages: worker.languages.clone(),
            load: worker.load,
            alive: worker.is_alive(),
            last_seen_ms: worker.last_seen.elapsed().as_millis() as u64,
        }
    }
}
