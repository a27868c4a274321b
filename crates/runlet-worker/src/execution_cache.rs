// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Worker-side memoization of compiled programs.
//!
//! Entries are keyed by `domain/program_uuid`. A cached artifact is reused
//! only when the new submission has the same identity (language, deadline and
//! checksum); otherwise the program is recompiled and the entry replaced.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use runlet_protocol::Task;
use runlet_sandbox::{
    CgiRequest, CgiResponse, CompiledProgram, Engine, Program, RunOutcome, SandboxError,
};
use serde::Serialize;
use tracing::{debug, info};

use crate::ttl_cache::TtlCache;

/// Counters exposed for monitoring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionStats {
    /// Programs compiled since start.
    pub compilations: u64,
    /// Submissions served from the cache.
    pub hits: u64,
    /// Program runs started.
    pub runs: u64,
    /// Programs currently cached.
    pub cached: usize,
    /// Runs abandoned past their deadline.
    pub abandoned: u64,
    /// Abandoned runs still occupying a blocking thread.
    pub stranded: usize,
}

/// Program ready to run plus the expiry of its cache entry.
#[derive(Debug)]
pub struct Prepared {
    /// Compiled program instance.
    pub program: Program,
    /// When the cached artifact expires (now, when caching is disabled).
    pub expires_at: DateTime<Utc>,
}

/// What a task run produced.
#[derive(Debug)]
pub enum TaskResult {
    /// Plain-mode run.
    Plain(RunOutcome),
    /// CGI-mode run.
    Http(CgiResponse),
}

/// Compiled-program cache in front of the sandbox engine.
pub struct ExecutionCache {
    engine: Arc<Engine>,
    programs: TtlCache<String, Arc<CompiledProgram>>,
    ttl: Duration,
    compilations: AtomicU64,
    hits: AtomicU64,
    runs: AtomicU64,
}

impl ExecutionCache {
    /// Create a cache. A zero `ttl` disables caching.
    pub fn new(engine: Arc<Engine>, ttl: Duration) -> Self {
        Self {
            engine,
            programs: TtlCache::new(),
            ttl,
            compilations: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            runs: AtomicU64::new(0),
        }
    }

    /// The engine used to compile and run programs.
    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Return the compiled program for `task`, compiling it on a miss.
    ///
    /// Compile failures are returned as is and nothing is cached.
    pub async fn get_or_compile(&self, task: &Task) -> Result<Prepared, SandboxError> {
        let mut program = Program::from_task(task)?;
        let key = program.info().key();

        if let Some(compiled) = self.programs.get(&key)
            && program.attach(compiled)
        {
            self.hits.fetch_add(1, Ordering::Relaxed);
            let expires_at = self.programs.expires_at(&key).unwrap_or_else(Utc::now);
            debug!(program = %key, "Compiled program cache hit");
            return Ok(Prepared {
                program,
                expires_at,
            });
        }

        let compiled = program.compile(&self.engine).await?;
        self.compilations.fetch_add(1, Ordering::Relaxed);

        let expires_at = if self.ttl.is_zero() {
            Utc::now()
        } else {
            self.programs.insert(key.clone(), compiled, self.ttl)
        };
        info!(program = %key, checksum = %program.info().checksum, "Program compiled");

        Ok(Prepared {
            program,
            expires_at,
        })
    }

    /// Compile (or reuse) and run a task, in CGI mode when it carries HTTP.
    pub async fn execute(
        &self,
        task: &Task,
        request: Option<CgiRequest>,
    ) -> Result<(TaskResult, DateTime<Utc>), SandboxError> {
        let Prepared {
            mut program,
            expires_at,
        } = self.get_or_compile(task).await?;

        self.runs.fetch_add(1, Ordering::Relaxed);
        let result = match request {
            Some(request) => TaskResult::Http(program.run_with_http(&self.engine, request).await?),
            None => TaskResult::Plain(program.run(&self.engine).await?),
        };
        Ok((result, expires_at))
    }

    /// Sum of the deadlines (ms) of every cached program.
    pub fn load(&self) -> u64 {
        self.programs
            .values()
            .iter()
            .map(|p| p.info.deadline.as_millis() as u64)
            .sum()
    }

    /// Current counters.
    pub fn stats(&self) -> ExecutionStats {
        ExecutionStats {
            compilations: self.compilations.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            runs: self.runs.load(Ordering::Relaxed),
            cached: self.programs.len(),
            abandoned: self.engine.abandoned_runs(),
            stranded: self.engine.stranded_runs(),
        }
    }

    /// Drop every cached program.
    pub fn clear(&self) {
        self.programs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runlet_sandbox::NoResolver;

    fn cache(ttl: Duration) -> ExecutionCache {
        ExecutionCache::new(Arc::new(Engine::new(Arc::new(NoResolver))), ttl)
    }

    fn task(id: &str, source: &str, deadline_ms: u64) -> Task {
        Task::new(
            "acme",
            id,
            "lua",
            Duration::from_millis(deadline_ms),
            source.as_bytes(),
        )
    }

    #[tokio::test]
    async fn test_compiles_once_within_ttl() {
        let cache = cache(Duration::from_secs(60));
        let t = task("p1", "return 1", 500);

        cache.get_or_compile(&t).await.unwrap();
        cache.get_or_compile(&t).await.unwrap();

        let stats = cache.stats();
        assert_eq!(stats.compilations, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.cached, 1);
    }

    #[tokio::test]
    async fn test_changed_source_recompiles() {
        let cache = cache(Duration::from_secs(60));
        cache
            .get_or_compile(&task("p1", "return 1", 500))
            .await
            .unwrap();
        cache
            .get_or_compile(&task("p1", "return 2", 500))
            .await
            .unwrap();

        let stats = cache.stats();
        assert_eq!(stats.compilations, 2);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.cached, 1);
    }

    #[tokio::test]
    async fn test_zero_ttl_disables_caching() {
        let cache = cache(Duration::ZERO);
        let t = task("p1", "return 1", 500);

        let first = cache.get_or_compile(&t).await.unwrap();
        assert!(first.expires_at <= Utc::now());
        cache.get_or_compile(&t).await.unwrap();

        assert_eq!(cache.stats().compilations, 2);
        assert_eq!(cache.stats().cached, 0);
    }

    #[tokio::test]
    async fn test_compile_error_not_cached() {
        let cache = cache(Duration::from_secs(60));
        let err = cache
            .get_or_compile(&task("p1", "return (", 500))
            .await
            .unwrap_err();
        assert!(err.is_compile_error());
        assert_eq!(cache.stats().cached, 0);
    }

    #[tokio::test]
    async fn test_load_is_sum_of_deadlines() {
        let cache = cache(Duration::from_secs(60));
        assert_eq!(cache.load(), 0);
        cache
            .get_or_compile(&task("p1", "return 1", 300))
            .await
            .unwrap();
        cache
            .get_or_compile(&task("p2", "return 1", 700))
            .await
            .unwrap();
        assert_eq!(cache.load(), 1000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let cache = cache(Duration::from_secs(5));
        let t = task("p1", "return 1", 100);
        cache.get_or_compile(&t).await.unwrap();

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(cache.stats().cached, 0);

        cache.get_or_compile(&t).await.unwrap();
        assert_eq!(cache.stats().compilations, 2);
    }

    #[tokio::test]
    async fn test_execute_plain_and_cgi() {
        let cache = cache(Duration::from_secs(60));

        let (result, _) = cache
            .execute(&task("p1", "return 'done'", 500), None)
            .await
            .unwrap();
        match result {
            TaskResult::Plain(outcome) => {
                assert_eq!(outcome.value, Some(serde_json::json!("done")))
            }
            TaskResult::Http(_) => panic!("expected a plain run"),
        }

        let payload = runlet_protocol::HttpPayload::new("GET", "/", b"");
        let cgi_task =
            task("p2", "require('cgi').write('hi')", 500).with_http(payload.clone());
        let request = CgiRequest::from_payload(&payload).unwrap();
        let (result, _) = cache.execute(&cgi_task, Some(request)).await.unwrap();
        match result {
            TaskResult::Http(response) => {
                assert_eq!(response.status, 200);
                assert_eq!(response.body, b"hi");
            }
            TaskResult::Plain(_) => panic!("expected a CGI run"),
        }
        assert_eq!(cache.stats().runs, 2);
    }
}
