// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Fire-and-forget task submission to workers.
//!
//! Each dispatch picks a worker, POSTs the task to `{base_uri}/v1/tasks` and
//! forgets about it. There is no retry and no queue: a firing that finds no
//! worker, or whose POST fails, is dropped, logged and counted.
//!
//! Workers answer with `X-Expires`, the time until which the compiled program
//! stays cached on them. While that time lies in the future (and the worker
//! is alive and accepts the language) the next dispatch of the same program
//! goes back to that worker.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use runlet_protocol::{API_PREFIX, EXPIRES_HEADER, Task, parse_expires};
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::workforce::{Worker, Workforce};

/// Errors dispatching one task.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No alive worker accepts the task's language.
    #[error("no worker available for language '{language}'")]
    NoWorkerAvailable {
        /// Language of the task.
        language: String,
    },

    /// The worker could not be reached.
    #[error("failed to reach worker {worker_id}: {source}")]
    Transport {
        /// Target worker.
        worker_id: String,
        /// Client error.
        #[source]
        source: reqwest::Error,
    },

    /// The worker answered with a non-success status.
    #[error("worker {worker_id} rejected task with status {status}")]
    Rejected {
        /// Target worker.
        worker_id: String,
        /// Response status.
        status: u16,
    },
}

/// Where a task went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatched {
    /// Worker that accepted the task.
    pub worker_id: String,
    /// Cache expiry advertised by the worker, if any.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Dispatch counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    /// Tasks accepted by a worker.
    pub dispatched: u64,
    /// Firings dropped for lack of a worker or a failed POST.
    pub dropped: u64,
}

#[derive(Debug, Clone)]
struct Affinity {
    worker_id: String,
    expires_at: DateTime<Utc>,
}

/// Sends tasks to the best available worker.
pub struct Dispatcher {
    workforce: Arc<Workforce>,
    http: reqwest::Client,
    affinity: RwLock<HashMap<String, Affinity>>,
    dispatched: AtomicU64,
    dropped: AtomicU64,
}

impl Dispatcher {
    /// Create a dispatcher selecting workers from `workforce`.
    pub fn new(workforce: Arc<Workforce>) -> Self {
        Self::with_client(workforce, reqwest::Client::new())
    }

    /// Create a dispatcher reusing an existing HTTP client.
    pub fn with_client(workforce: Arc<Workforce>, http: reqwest::Client) -> Self {
        Self {
            workforce,
            http,
            affinity: RwLock::new(HashMap::new()),
            dispatched: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Submit a routine firing, logging and counting a drop on failure.
    ///
    /// Affinity is only recorded while `trigger` is not cancelled.
    pub async fn fire(&self, task: &Task, trigger: &CancellationToken) {
        match self.send(task).await {
            Ok(dispatched) => self.remember(&task.program_key(), &dispatched, Some(trigger)),
            Err(e) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    program = %task.program_key(),
                    error = %e,
                    "Dropped routine firing"
                );
            }
        }
    }

    /// Submit `task` to one worker.
    pub async fn dispatch(&self, task: &Task) -> Result<Dispatched, DispatchError> {
        let dispatched = self.send(task).await?;
        self.remember(&task.program_key(), &dispatched, None);
        Ok(dispatched)
    }

    async fn send(&self, task: &Task) -> Result<Dispatched, DispatchError> {
        let key = task.program_key();
        let worker = self.select(&key, &task.language)?;

        let response = self
            .http
            .post(format!("{}{}/tasks", worker.base_uri(), API_PREFIX))
            .timeout(task.deadline() + self.workforce.timeout())
            .json(task)
            .send()
            .await
            .map_err(|source| DispatchError::Transport {
                worker_id: worker.id.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DispatchError::Rejected {
                worker_id: worker.id,
                status: status.as_u16(),
            });
        }

        let expires_at = response
            .headers()
            .get(EXPIRES_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_expires);

        self.dispatched.fetch_add(1, Ordering::Relaxed);
        debug!(program = %key, worker_id = %worker.id, "Task dispatched");

        Ok(Dispatched {
            worker_id: worker.id,
            expires_at,
        })
    }

    fn remember(
        &self,
        program_key: &str,
        dispatched: &Dispatched,
        trigger: Option<&CancellationToken>,
    ) {
        let Some(expires_at) = dispatched.expires_at.filter(|at| *at > Utc::now()) else {
            return;
        };
        let mut affinity = self.affinity.write().unwrap_or_else(|e| e.into_inner());
        // Checked under the lock `forget` takes after the trigger is cancelled.
        if trigger.is_some_and(|t| t.is_cancelled()) {
            return;
        }
        affinity.insert(
            program_key.to_string(),
            Affinity {
                worker_id: dispatched.worker_id.clone(),
                expires_at,
            },
        );
    }

    /// Worker that would receive the next task for `program_key`.
    pub fn select(&self, program_key: &str, language: &str) -> Result<Worker, DispatchError> {
        if let Some(worker) = self.preferred(program_key, language) {
            return Ok(worker);
        }
        self.workforce
            .pick_available_for(language)
            .map_err(|_| DispatchError::NoWorkerAvailable {
                language: language.to_string(),
            })
    }

    fn preferred(&self, program_key: &str, language: &str) -> Option<Worker> {
        let affinity = {
            let affinity = self.affinity.read().unwrap_or_else(|e| e.into_inner());
            affinity.get(program_key).cloned()?
        };
        if affinity.expires_at <= Utc::now() {
            self.forget_expired(program_key);
            return None;
        }
        self.workforce
            .get(&affinity.worker_id)
            .filter(|w| w.is_alive() && w.supports(language))
    }

    /// Forget the affinity of a program (e.g. after it was removed).
    pub fn forget(&self, program_key: &str) {
        let mut affinity = self.affinity.write().unwrap_or_else(|e| e.into_inner());
        affinity.remove(program_key);
    }

    fn forget_expired(&self, program_key: &str) {
        let mut affinity = self.affinity.write().unwrap_or_else(|e| e.into_inner());
        if affinity
            .get(program_key)
            .is_some_and(|a| a.expires_at <= Utc::now())
        {
            affinity.remove(program_key);
        }
    }

    /// Number of programs with a recorded worker affinity.
    pub fn affinities(&self) -> usize {
        self.affinity.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Current counters.
    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}
