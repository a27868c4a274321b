// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Program instances and their compiled form.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use runlet_protocol::Task;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::cgi::{CgiRequest, CgiResponse};
use crate::engine::Engine;
use crate::error::{Result, SandboxError};

/// Identity of a program submission.
///
/// Two submissions for the same program id are the same program iff domain,
/// language, deadline and content checksum all match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProgramInfo {
    /// Owning tenant domain.
    pub domain: String,
    /// Program id within the domain.
    pub program_uuid: String,
    /// Script language.
    pub language: String,
    /// Execution deadline.
    pub deadline: Duration,
    /// Hex SHA-256 of the source.
    pub checksum: String,
}

impl ProgramInfo {
    /// Build the identity of `source`.
    pub fn new(
        domain: impl Into<String>,
        program_uuid: impl Into<String>,
        language: impl Into<String>,
        deadline: Duration,
        source: &[u8],
    ) -> Self {
        Self {
            domain: domain.into(),
            program_uuid: program_uuid.into(),
            language: language.into(),
            deadline,
            checksum: hex::encode(Sha256::digest(source)),
        }
    }

    /// Cache key on the worker: `domain/program_uuid`.
    pub fn key(&self) -> String {
        format!("{}/{}", self.domain, self.program_uuid)
    }
}

/// Compiled program: validated source plus every resolved module.
#[derive(Debug)]
pub struct CompiledProgram {
    /// Identity of the source this was compiled from.
    pub info: ProgramInfo,
    pub(crate) source: String,
    /// Resolved named modules keyed by the import string as written.
    pub(crate) modules: HashMap<String, String>,
    /// Capability modules referenced by the program or its modules.
    pub(crate) capabilities: Vec<String>,
}

impl CompiledProgram {
    /// Import strings of the resolved named modules.
    pub fn module_imports(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    /// Capability modules referenced statically.
    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }
}

/// Lifecycle state of a [`Program`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramState {
    /// Not compiled yet.
    Uncompiled,
    /// Compiled and ready to run.
    Compiled,
    /// A run is in progress.
    Running,
    /// The last run finished successfully.
    Completed,
    /// Compilation or the last run failed.
    Failed,
    /// The last run hit its deadline.
    DeadlineExceeded,
}

/// Result of a plain run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    /// Value returned by the script, if it returned a JSON-representable one.
    pub value: Option<serde_json::Value>,
    /// Wall-clock execution time.
    pub duration: Duration,
}

/// One program instance built from a task.
#[derive(Debug)]
pub struct Program {
    info: ProgramInfo,
    source: Vec<u8>,
    accepts_http: bool,
    state: ProgramState,
    compiled: Option<Arc<CompiledProgram>>,
}

impl PartialEq for Program {
    fn eq(&self, other: &Self) -> bool {
        self.info == other.info
    }
}

impl Eq for Program {}

impl Program {
    /// Create an uncompiled program.
    pub fn new(info: ProgramInfo, source: Vec<u8>, accepts_http: bool) -> Self {
        Self {
            info,
            source,
            accepts_http,
            state: ProgramState::Uncompiled,
            compiled: None,
        }
    }

    /// Build a program from a dispatched task.
    pub fn from_task(task: &Task) -> Result<Self> {
        let source = task.decode_source().map_err(|_| SandboxError::InvalidSource)?;
        let info = ProgramInfo::new(
            &task.domain,
            &task.program_uuid,
            &task.language,
            task.deadline(),
            &source,
        );
        Ok(Self::new(info, source, task.http.is_some()))
    }

    /// Program identity.
    pub fn info(&self) -> &ProgramInfo {
        &self.info
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ProgramState {
        self.state
    }

    /// Whether the program was submitted with an HTTP request.
    pub fn accepts_http(&self) -> bool {
        self.accepts_http
    }

    /// Compiled artifact, once compiled or attached.
    pub fn compiled(&self) -> Option<&Arc<CompiledProgram>> {
        self.compiled.as_ref()
    }

    /// Compile the program, resolving its imports through the engine.
    pub async fn compile(&mut self, engine: &Engine) -> Result<Arc<CompiledProgram>> {
        if let Some(compiled) = &self.compiled {
            return Ok(compiled.clone());
        }

        match engine.compile(&self.info, &self.source).await {
            Ok(compiled) => {
                let compiled = Arc::new(compiled);
                self.compiled = Some(compiled.clone());
                self.state = ProgramState::Compiled;
                Ok(compiled)
            }
            Err(e) => {
                self.state = ProgramState::Failed;
                Err(e)
            }
        }
    }

    /// Reuse an artifact compiled earlier for the same program.
    ///
    /// Returns `false` and leaves the program untouched when the artifact was
    /// compiled from a different submission.
    pub fn attach(&mut self, compiled: Arc<CompiledProgram>) -> bool {
        if compiled.info != self.info {
            return false;
        }
        self.compiled = Some(compiled);
        self.state = ProgramState::Compiled;
        true
    }

    /// Run in plain mode.
    pub async fn run(&mut self, engine: &Engine) -> Result<RunOutcome> {
        let execution = self.execute(engine, None).await?;
        Ok(RunOutcome {
            value: execution.value,
            duration: execution.duration,
        })
    }

    /// Run in CGI mode, returning the response the script produced.
    pub async fn run_with_http(
        &mut self,
        engine: &Engine,
        request: CgiRequest,
    ) -> Result<CgiResponse> {
        if !self.accepts_http {
            return Err(SandboxError::CgiUnsupported);
        }
        let execution = self.execute(engine, Some(request)).await?;
        Ok(execution.response.unwrap_or_default())
    }

    async fn execute(
        &mut self,
        engine: &Engine,
        request: Option<CgiRequest>,
    ) -> Result<crate::engine::Execution> {
        let compiled = self.compile(engine).await?;

        self.state = ProgramState::Running;
        let result = engine
            .execute(compiled, self.info.deadline, request)
            .await;

        self.state = match &result {
            Ok(execution) => {
                debug!(
                    program = %self.info.key(),
                    duration_ms = execution.duration.as_millis() as u64,
                    value = ?execution.value,
                    "Program completed"
                );
                ProgramState::Completed
            }
            Err(SandboxError::DeadlineExceeded { .. }) => ProgramState::DeadlineExceeded,
            Err(_) => ProgramState::Failed,
        };
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runlet_protocol::HttpPayload;

    fn task(source: &[u8]) -> Task {
        Task::new("acme", "p1", "lua", Duration::from_millis(500), source)
    }

    #[test]
    fn test_program_equality() {
        let a = Program::from_task(&task(b"return 1")).unwrap();
        let b = Program::from_task(&task(b"return 1")).unwrap();
        let c = Program::from_task(&task(b"return 2")).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);

        let mut slower = task(b"return 1");
        slower.deadline = 900;
        assert_ne!(a, Program::from_task(&slower).unwrap());
    }

    #[test]
    fn test_program_from_task() {
        let program = Program::from_task(&task(b"return 1")).unwrap();
        assert_eq!(program.state(), ProgramState::Uncompiled);
        assert!(!program.accepts_http());
        assert_eq!(program.info().key(), "acme/p1");
        assert_eq!(program.info().checksum.len(), 64);

        let cgi = task(b"return 1").with_http(HttpPayload::default());
        assert!(Program::from_task(&cgi).unwrap().accepts_http());
    }

    #[test]
    fn test_program_from_task_bad_base64() {
        let mut bad = task(b"");
        bad.source_code = "***".into();
        assert!(matches!(
            Program::from_task(&bad),
            Err(SandboxError::InvalidSource)
        ));
    }
}
