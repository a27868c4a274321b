// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Runlet Sandbox - capability-limited execution of tenant programs
//!
//! This crate compiles and runs one program at a time inside a restricted Lua
//! 5.4 state. It is used by `runlet-worker` behind its execution cache.
//!
//! # Program lifecycle
//!
//! ```text
//! Uncompiled ──compile──► Compiled ──run──► Running ──┬──► Completed
//!                                                     ├──► Failed
//!                                                     └──► DeadlineExceeded
//! ```
//!
//! `run` and `run_with_http` compile lazily when needed.
//!
//! # Imports
//!
//! Programs declare imports with `require("name")`. A name is either one of
//! the built-in capability modules listed below or a named module resolved
//! through a [`ModuleResolver`] at compile time (`require("lib@3")` pins a
//! revision, no suffix means latest). Anything else fails compilation with
//! `IMPORT_NOT_ALLOWED`.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `text` | string helpers (split, join, trim, ...) |
//! | `math` | Lua math library |
//! | `times` | clock and RFC 3339 formatting |
//! | `json`, `base64`, `hex` | encoding |
//! | `fmt` | `sprintf`/`sprint` without stdio |
//! | `log` | structured log sink |
//! | `http` | restricted HTTP client bounded by the deadline |
//! | `cgi` | request/response bridge, CGI mode only |
//!
//! # Deadlines
//!
//! Scripts run on the blocking thread pool. An instruction hook aborts the
//! script once its deadline passes, and the host stops waiting shortly after
//! in case the script is stuck inside a host call.

#![deny(missing_docs)]

mod capabilities;
pub mod cgi;
pub mod engine;
pub mod error;
pub mod imports;
pub mod program;

pub use cgi::{CgiRequest, CgiResponse};
pub use engine::{Engine, EngineConfig, Execution};
pub use error::{Result, SandboxError};
pub use imports::{
    ImportSpec, ModuleRef, ModuleResolver, NoResolver, ResolveError, Revision, StaticResolver,
};
pub use program::{CompiledProgram, Program, ProgramInfo, ProgramState, RunOutcome};

/// Language tag of Lua programs on the wire.
pub const LUA: &str = "lua";

/// Names of the built-in capability modules, in declaration order.
pub fn builtin_modules() -> impl Iterator<Item = &'static str> {
    capabilities::CAPABILITIES.iter().map(|c| c.name)
}
