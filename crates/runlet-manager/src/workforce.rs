// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Worker registry.
//!
//! The [`Workforce`] is an in-memory directory of subscribed execution
//! workers. Workers refresh their `last_seen` through load reports; a worker
//! is alive while `now < last_seen + timeout`. Dead workers are never picked
//! and are removed by [`Workforce::sweep_inactive`].

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use runlet_protocol::Subscription;
use thiserror::Error;
use tokio::time::Instant;

/// A subscribed execution worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Worker {
    /// Id chosen by the worker, usually a UUID.
    pub id: String,
    /// `http` or `https`.
    pub scheme: String,
    /// Host and port, possibly with embedded credentials.
    pub authority: String,
    /// Languages the worker accepts. Empty means any.
    pub languages: Vec<String>,
    /// Last reported load. Lower is more available.
    pub load: u64,
    /// When the worker subscribed or last reported load.
    pub last_seen: Instant,
    /// How long the worker stays alive without a report.
    pub timeout: Duration,
}

impl Worker {
    /// Create a worker from its subscription, seen now with zero load.
    pub fn from_subscription(subscription: Subscription, timeout: Duration) -> Self {
        Self {
            id: subscription.uuid,
            scheme: subscription.scheme,
            authority: subscription.authority,
            languages: subscription.languages,
            load: 0,
            last_seen: Instant::now(),
            timeout,
        }
    }

    /// `scheme://authority`
    pub fn base_uri(&self) -> String {
        format!("{}://{}", self.scheme, self.authority)
    }

    /// Whether the worker reported within its timeout.
    pub fn is_alive(&self) -> bool {
        Instant::now() < self.last_seen + self.timeout
    }

    /// Whether the worker accepts programs written in `language`.
    pub fn supports(&self, language: &str) -> bool {
        self.languages.is_empty() || self.languages.iter().any(|l| l == language)
    }
}

/// Errors returned by worker selection.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkforceError {
    /// No alive worker matched.
    #[error("no worker available")]
    NoWorkerAvailable,
}

/// In-memory directory of subscribed workers.
#[derive(Debug)]
pub struct Workforce {
    workers: RwLock<HashMap<String, Worker>>,
    timeout: Duration,
}

impl Workforce {
    /// Create an empty registry whose workers expire after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            workers: RwLock::new(HashMap::new()),
            timeout,
        }
    }

    /// Liveness timeout given to newly registered workers.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Register or replace a worker from its subscription.
    pub fn subscribe(&self, subscription: Subscription) -> Worker {
        let worker = Worker::from_subscription(subscription, self.timeout);
        self.register(worker.clone());
        worker
    }

    /// Insert `worker`, replacing any entry with the same id.
    pub fn register(&self, worker: Worker) {
        let mut workers = self.workers.write().unwrap_or_else(|e| e.into_inner());
        workers.insert(worker.id.clone(), worker);
    }

    /// Remove a worker. Returns it if it was known.
    pub fn unregister(&self, id: &str) -> Option<Worker> {
        let mut workers = self.workers.write().unwrap_or_else(|e| e.into_inner());
        workers.remove(id)
    }

    /// Whether a worker with this id is registered (alive or not).
    pub fn exists(&self, id: &str) -> bool {
        let workers = self.workers.read().unwrap_or_else(|e| e.into_inner());
        workers.contains_key(id)
    }

    /// Snapshot of one worker.
    pub fn get(&self, id: &str) -> Option<Worker> {
        let workers = self.workers.read().unwrap_or_else(|e| e.into_inner());
        workers.get(id).cloned()
    }

    /// Snapshot of every registered worker.
    pub fn list(&self) -> Vec<Worker> {
        let workers = self.workers.read().unwrap_or_else(|e| e.into_inner());
        workers.values().cloned().collect()
    }

    /// Number of registered workers.
    pub fn len(&self) -> usize {
        let workers = self.workers.read().unwrap_or_else(|e| e.into_inner());
        workers.len()
    }

    /// Whether no worker is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Update load and last-seen. Returns `false` if the worker is unknown.
    pub fn report_load(&self, id: &str, load: u64) -> bool {
        let mut workers = self.workers.write().unwrap_or_else(|e| e.into_inner());
        match workers.get_mut(id) {
            Some(worker) => {
                worker.load = load;
                worker.last_seen = Instant::now();
                true
            }
            None => false,
        }
    }

    /// The alive worker with the lowest load.
    pub fn pick_available(&self) -> Result<Worker, WorkforceError> {
        self.pick(|_| true)
    }

    /// The alive worker with the lowest load among those accepting `language`.
    pub fn pick_available_for(&self, language: &str) -> Result<Worker, WorkforceError> {
        self.pick(|w| w.supports(language))
    }

    fn pick(&self, accept: impl Fn(&Worker) -> bool) -> Result<Worker, WorkforceError> {
        let workers = self.workers.read().unwrap_or_else(|e| e.into_inner());
        workers
            .values()
            .filter(|w| w.is_alive() && accept(w))
            .min_by_key(|w| w.load)
            .cloned()
            .ok_or(WorkforceError::NoWorkerAvailable)
    }

    /// Remove and return every worker that is no longer alive.
    pub fn sweep_inactive(&self) -> Vec<Worker> {
        let mut workers = self.workers.write().unwrap_or_else(|e| e.into_inner());
        let dead: Vec<String> = workers
            .values()
            .filter(|w| !w.is_alive())
            .map(|w| w.id.clone())
            .collect();
        dead.iter().filter_map(|id| workers.remove(id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscription(id: &str, languages: &[&str]) -> Subscription {
        Subscription {
            uuid: id.to_string(),
            scheme: "http".to_string(),
            authority: format!("{id}.internal:8090"),
            languages: languages.iter().map(|l| l.to_string()).collect(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_register_and_unregister() {
        let workforce = Workforce::new(Duration::from_secs(15));
        workforce.subscribe(subscription("a", &["lua"]));

        assert!(workforce.exists("a"));
        assert_eq!(workforce.get("a").unwrap().base_uri(), "http://a.internal:8090");

        assert!(workforce.unregister("a").is_some());
        assert!(!workforce.exists("a"));
        assert!(workforce.unregister("a").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_register_is_upsert() {
        let workforce = Workforce::new(Duration::from_secs(15));
        workforce.subscribe(subscription("a", &[]));
        assert!(workforce.report_load("a", 900));

        workforce.subscribe(subscription("a", &["lua"]));

        let worker = workforce.get("a").unwrap();
        assert_eq!(workforce.len(), 1);
        assert_eq!(worker.load, 0);
        assert_eq!(worker.languages, vec!["lua".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_report_load_unknown() {
        let workforce = Workforce::new(Duration::from_secs(15));
        assert!(!workforce.report_load("ghost", 10));
        assert!(workforce.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pick_lowest_load() {
        let workforce = Workforce::new(Duration::from_secs(15));
        for id in ["a", "b", "c"] {
            workforce.subscribe(subscription(id, &[]));
        }
        workforce.report_load("a", 300);
        workforce.report_load("b", 100);
        workforce.report_load("c", 200);

        assert_eq!(workforce.pick_available().unwrap().id, "b");
    }

    #[tokio::test(start_paused = true)]
    async fn test_pick_skips_dead_workers() {
        let workforce = Workforce::new(Duration::from_secs(15));
        workforce.subscribe(subscription("idle", &[]));
        tokio::time::advance(Duration::from_secs(10)).await;
        workforce.subscribe(subscription("busy", &[]));
        workforce.report_load("busy", 5_000);

        tokio::time::advance(Duration::from_secs(6)).await;

        assert!(!workforce.get("idle").unwrap().is_alive());
        assert_eq!(workforce.pick_available().unwrap().id, "busy");
    }

    #[tokio::test(start_paused = true)]
    async fn test_pick_empty() {
        let workforce = Workforce::new(Duration::from_secs(15));
        assert_eq!(
            workforce.pick_available(),
            Err(WorkforceError::NoWorkerAvailable)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_pick_available_for_language() {
        let workforce = Workforce::new(Duration::from_secs(15));
        workforce.subscribe(subscription("js", &["javascript"]));
        workforce.subscribe(subscription("lua", &["lua"]));
        workforce.report_load("lua", 1_000);

        assert_eq!(workforce.pick_available().unwrap().id, "js");
        assert_eq!(workforce.pick_available_for("lua").unwrap().id, "lua");
        assert!(workforce.pick_available_for("python").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_exactly_dead() {
        let workforce = Workforce::new(Duration::from_secs(15));
        workforce.subscribe(subscription("old", &[]));
        workforce.subscribe(subscription("fresh", &[]));

        tokio::time::advance(Duration::from_secs(10)).await;
        workforce.report_load("fresh", 1);
        tokio::time::advance(Duration::from_secs(10)).await;

        let swept = workforce.sweep_inactive();

        assert_eq!(swept.len(), 1);
        assert_eq!(swept[0].id, "old");
        assert!(workforce.exists("fresh"));
        assert!(workforce.sweep_inactive().is_empty());
    }
}
