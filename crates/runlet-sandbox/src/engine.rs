// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Compilation and deadline-bounded execution of Lua programs.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use mlua::{
    ChunkMode, HookTriggers, Lua, LuaOptions, LuaSerdeExt, StdLib, Table, Value, VmState,
};
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::LUA;
use crate::capabilities::{self, HostContext};
use crate::cgi::{CgiExchange, CgiRequest, CgiResponse};
use crate::error::{Result, SandboxError};
use crate::imports::{ImportSpec, ModuleRef, ModuleResolver, ResolveError, scan_imports};
use crate::program::{CompiledProgram, ProgramInfo};

const LOADED_KEY: &str = "runlet.loaded";

const RUNNING: u8 = 0;
const ABANDONED: u8 = 1;
const FINISHED: u8 = 2;

/// Wraps `pcall`/`xpcall` so a script cannot swallow the deadline error.
const PRELUDE: &str = r#"
local expired = ...
local raw_pcall, raw_xpcall, raw_error = pcall, xpcall, error

local function check(ok, ...)
    if not ok and expired() then
        raw_error((...), 0)
    end
    return ok, ...
end

pcall = function(f, ...)
    return check(raw_pcall(f, ...))
end

xpcall = function(f, handler, ...)
    return check(raw_xpcall(f, function(e)
        if expired() then
            return e
        end
        return handler(e)
    end, ...))
end
"#;

/// Globals removed from every script state.
const REMOVED_GLOBALS: &[&str] = &["print", "dofile", "loadfile", "load", "collectgarbage"];

/// Engine tuning.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Memory cap of one script state in bytes.
    pub memory_limit: usize,
    /// The deadline is checked every this many VM instructions.
    pub instruction_stride: u32,
    /// How long past the deadline the host waits for a script stuck in a
    /// host call before giving up on it.
    pub deadline_grace: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            memory_limit: 64 * 1024 * 1024,
            instruction_stride: 1_000,
            deadline_grace: Duration::from_millis(250),
        }
    }
}

/// Output of one execution.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    /// Value returned by the main chunk, when JSON-representable.
    pub value: Option<serde_json::Value>,
    /// Response built through the `cgi` module (CGI mode only).
    pub response: Option<CgiResponse>,
    /// Wall-clock execution time.
    pub duration: Duration,
}

/// Compiles and runs programs.
pub struct Engine {
    config: EngineConfig,
    resolver: Arc<dyn ModuleResolver>,
    http: reqwest::Client,
    threads: Arc<ThreadCounters>,
}

/// Script threads given up on after their deadline.
#[derive(Debug, Default)]
struct ThreadCounters {
    abandoned: AtomicU64,
    stranded: AtomicUsize,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Create an engine with default settings.
    pub fn new(resolver: Arc<dyn ModuleResolver>) -> Self {
        Self::with_config(resolver, EngineConfig::default())
    }

    /// Create an engine with explicit settings.
    pub fn with_config(resolver: Arc<dyn ModuleResolver>, config: EngineConfig) -> Self {
        Self {
            config,
            resolver,
            http: reqwest::Client::new(),
            threads: Arc::default(),
        }
    }

    /// Engine settings.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Runs abandoned past their deadline since start.
    pub fn abandoned_runs(&self) -> u64 {
        self.threads.abandoned.load(Ordering::Relaxed)
    }

    /// Abandoned runs whose thread is still busy, typically inside a single
    /// long C call the instruction hook cannot interrupt.
    pub fn stranded_runs(&self) -> usize {
        self.threads.stranded.load(Ordering::SeqCst)
    }

    /// Languages this engine compiles.
    pub fn languages(&self) -> &'static [&'static str] {
        &[LUA]
    }

    /// Validate a program and resolve every named module it imports.
    ///
    /// Named modules are resolved recursively; each import string is fetched
    /// at most once per compilation.
    pub async fn compile(&self, info: &ProgramInfo, source: &[u8]) -> Result<CompiledProgram> {
        if info.language != LUA {
            return Err(SandboxError::UnsupportedLanguage(info.language.clone()));
        }
        let source = std::str::from_utf8(source)
            .map_err(|_| SandboxError::InvalidSource)?
            .to_string();

        let scratch = Lua::new_with(StdLib::NONE, LuaOptions::default())
            .map_err(|e| SandboxError::Internal(e.to_string()))?;
        syntax_check(&scratch, &info.key(), &source)?;

        let mut modules: HashMap<String, String> = HashMap::new();
        let mut capabilities: Vec<String> = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut pending: VecDeque<String> = scan_imports(&source).into();

        while let Some(import) = pending.pop_front() {
            if !visited.insert(import.clone()) {
                continue;
            }
            let spec = ImportSpec::parse(&import)?;

            if capabilities::is_builtin(&spec.name) {
                if spec.revision.is_some() {
                    return Err(SandboxError::MalformedImport {
                        import,
                        reason: "capability modules have no revisions".to_string(),
                    });
                }
                capabilities.push(spec.name);
                continue;
            }

            let module = ModuleRef {
                domain: info.domain.clone(),
                name: spec.name.clone(),
                revision: spec.effective_revision(),
                language: info.language.clone(),
            };
            let code = match self.resolver.resolve(&module).await {
                Ok(code) => code,
                Err(ResolveError::NotFound(_)) => {
                    return Err(SandboxError::ImportNotAllowed { module: spec.name });
                }
                Err(e) => return Err(SandboxError::Resolve(e)),
            };
            let code = String::from_utf8(code).map_err(|_| SandboxError::Compile {
                chunk: import.clone(),
                message: "module source is not valid UTF-8".to_string(),
            })?;
            syntax_check(&scratch, &import, &code)?;

            debug!(program = %info.key(), module = %module, "Resolved module");
            pending.extend(scan_imports(&code));
            modules.insert(import, code);
        }

        Ok(CompiledProgram {
            info: info.clone(),
            source,
            modules,
            capabilities,
        })
    }

    /// Run a compiled program, bounded by `deadline`.
    ///
    /// The script runs on the blocking pool so a long run never stalls the
    /// async workers. With `request` set, the `cgi` module is available and
    /// the accumulated response is returned.
    pub async fn execute(
        &self,
        compiled: Arc<CompiledProgram>,
        deadline: Duration,
        request: Option<CgiRequest>,
    ) -> Result<Execution> {
        let started = Instant::now();
        let deadline_at = started + deadline;
        let cancelled = Arc::new(AtomicBool::new(false));
        let expired = Arc::new(AtomicBool::new(false));
        let exchange = request.map(|r| Arc::new(Mutex::new(CgiExchange::new(r))));

        let ctx = HostContext {
            domain: compiled.info.domain.clone(),
            program: compiled.info.program_uuid.clone(),
            deadline_at,
            memory_limit: self.config.memory_limit,
            http: self.http.clone(),
            handle: Handle::current(),
            cgi: exchange.clone(),
        };
        let run = RunSettings {
            memory_limit: self.config.memory_limit,
            stride: self.config.instruction_stride.max(1),
            deadline_at,
            cancelled: cancelled.clone(),
            expired: expired.clone(),
        };

        let state = Arc::new(AtomicU8::new(RUNNING));
        let job = {
            let state = state.clone();
            let threads = self.threads.clone();
            tokio::task::spawn_blocking(move || {
                let outcome = run_script(compiled, ctx, run);
                if state.swap(FINISHED, Ordering::SeqCst) == ABANDONED {
                    threads.stranded.fetch_sub(1, Ordering::SeqCst);
                    debug!("Abandoned script thread finished");
                }
                outcome
            })
        };
        let outcome = match tokio::time::timeout(deadline + self.config.deadline_grace, job).await
        {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(join_err)) => {
                return Err(SandboxError::Internal(format!(
                    "script thread failed: {join_err}"
                )));
            }
            Err(_) => {
                cancelled.store(true, Ordering::SeqCst);
                // Counted before the state flips so the thread never decrements first.
                let stranded = self.threads.stranded.fetch_add(1, Ordering::SeqCst) + 1;
                if state
                    .compare_exchange(RUNNING, ABANDONED, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
                {
                    self.threads.stranded.fetch_sub(1, Ordering::SeqCst);
                    return Err(SandboxError::DeadlineExceeded { deadline });
                }
                let abandoned = self.threads.abandoned.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    deadline_ms = deadline.as_millis() as u64,
                    abandoned,
                    stranded,
                    "Script did not yield after its deadline; abandoned"
                );
                return Err(SandboxError::DeadlineExceeded { deadline });
            }
        };

        let value = match outcome {
            Ok(value) => value,
            Err(_) if expired.load(Ordering::SeqCst) => {
                return Err(SandboxError::DeadlineExceeded { deadline });
            }
            Err(e) => return Err(e),
        };

        let response = exchange.map(|exchange| {
            let mut guard = exchange.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut guard.response)
        });

        Ok(Execution {
            value,
            response,
            duration: started.elapsed(),
        })
    }
}

struct RunSettings {
    memory_limit: usize,
    stride: u32,
    deadline_at: Instant,
    cancelled: Arc<AtomicBool>,
    expired: Arc<AtomicBool>,
}

fn syntax_check(lua: &Lua, chunk: &str, source: &str) -> Result<()> {
    lua.load(source)
        .set_name(chunk)
        .set_mode(ChunkMode::Text)
        .into_function()
        .map(|_| ())
        .map_err(|e| SandboxError::Compile {
            chunk: chunk.to_string(),
            message: e.to_string(),
        })
}

fn internal(e: mlua::Error) -> SandboxError {
    SandboxError::Internal(e.to_string())
}

/// Body of the blocking task: build a fresh state and run the main chunk.
fn run_script(
    compiled: Arc<CompiledProgram>,
    ctx: HostContext,
    run: RunSettings,
) -> Result<Option<serde_json::Value>> {
    let lua = Lua::new_with(
        StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::UTF8,
        LuaOptions::default(),
    )
    .map_err(internal)?;
    lua.set_memory_limit(run.memory_limit).map_err(internal)?;

    let globals = lua.globals();
    for name in REMOVED_GLOBALS {
        globals.set(*name, Value::Nil).map_err(internal)?;
    }
    lua.set_named_registry_value(LOADED_KEY, lua.create_table().map_err(internal)?)
        .map_err(internal)?;
    globals
        .set("require", require_fn(&lua, compiled.clone(), ctx).map_err(internal)?)
        .map_err(internal)?;

    let RunSettings {
        deadline_at,
        cancelled,
        expired,
        stride,
        ..
    } = run;

    let flag = expired.clone();
    let expired_fn = lua
        .create_function(move |_, ()| Ok(flag.load(Ordering::SeqCst)))
        .map_err(internal)?;
    lua.load(PRELUDE)
        .set_name("prelude")
        .call::<()>(expired_fn)
        .map_err(internal)?;
    lua.set_hook(
        HookTriggers::new().every_nth_instruction(stride),
        move |_, _| {
            if cancelled.load(Ordering::Relaxed) || Instant::now() >= deadline_at {
                expired.store(true, Ordering::SeqCst);
                return Err(mlua::Error::runtime("deadline exceeded"));
            }
            Ok(VmState::Continue)
        },
    );

    let result = lua
        .load(compiled.source.as_str())
        .set_name(compiled.info.key())
        .set_mode(ChunkMode::Text)
        .call::<Value>(());

    match result {
        Ok(Value::Nil) => Ok(None),
        Ok(value) => match lua.from_value::<serde_json::Value>(value) {
            Ok(json) => Ok(Some(json)),
            Err(e) => {
                debug!(
                    program = %compiled.info.key(),
                    error = %e,
                    "Return value is not serializable"
                );
                Ok(None)
            }
        },
        Err(e) => Err(SandboxError::Runtime {
            message: e.to_string(),
        }),
    }
}

/// Host `require`: serves capability modules and modules resolved at compile time.
fn require_fn(
    lua: &Lua,
    compiled: Arc<CompiledProgram>,
    ctx: HostContext,
) -> mlua::Result<mlua::Function> {
    lua.create_function(move |lua, import: String| {
        let loaded: Table = lua.named_registry_value(LOADED_KEY)?;
        let cached: Value = loaded.get(import.as_str())?;
        if !cached.is_nil() {
            return Ok(cached);
        }

        let value = if let Some(capability) = capabilities::lookup(&import) {
            Value::Table((capability.install)(lua, &ctx)?)
        } else if let Some(code) = compiled.modules.get(&import) {
            let value: Value = lua
                .load(code.as_str())
                .set_name(import.as_str())
                .set_mode(ChunkMode::Text)
                .call(())?;
            if value.is_nil() {
                Value::Boolean(true)
            } else {
                value
            }
        } else {
            return Err(mlua::Error::runtime(format!(
                "import '{import}' is not allowed"
            )));
        };

        loaded.set(import.as_str(), value.clone())?;
        Ok(value)
    })
}
