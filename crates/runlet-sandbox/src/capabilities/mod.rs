// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Built-in capability modules.
//!
//! The allow-list is the static [`CAPABILITIES`] table. Each entry builds the
//! module table for one run from the [`HostContext`] of that run.

mod cgi;
mod codec;
mod fmt;
mod http;
mod log;
mod text;
mod times;

use std::sync::{Arc, Mutex};
use std::time::Instant;

use mlua::{Lua, Table};
use tokio::runtime::Handle;

use crate::cgi::CgiExchange;

/// Host state visible to capability modules during one run.
#[derive(Clone)]
pub(crate) struct HostContext {
    pub(crate) domain: String,
    pub(crate) program: String,
    pub(crate) deadline_at: Instant,
    pub(crate) memory_limit: usize,
    pub(crate) http: reqwest::Client,
    pub(crate) handle: Handle,
    pub(crate) cgi: Option<Arc<Mutex<CgiExchange>>>,
}

impl HostContext {
    /// Time left before the deadline, if any.
    pub(crate) fn remaining(&self) -> Option<std::time::Duration> {
        self.deadline_at
            .checked_duration_since(Instant::now())
            .filter(|d| !d.is_zero())
    }

    /// Budget for host-built values returned to `lua`.
    pub(crate) fn output_budget(&self) -> OutputBudget {
        OutputBudget {
            memory_limit: self.memory_limit,
        }
    }
}

/// Largest value a capability may build on the host for one call.
const MAX_OUTPUT_LEN: usize = 16 * 1024 * 1024;

/// Size check for values a capability builds outside the Lua allocator.
///
/// Host allocations are not counted by the state's memory limit, so every
/// helper whose output can outgrow its input checks the predicted size first.
#[derive(Debug, Clone, Copy)]
pub(crate) struct OutputBudget {
    memory_limit: usize,
}

impl OutputBudget {
    /// Bytes still available to a value produced for `lua`.
    pub(crate) fn available(&self, lua: &Lua) -> usize {
        self.memory_limit
            .saturating_sub(lua.used_memory())
            .min(MAX_OUTPUT_LEN)
    }

    /// Fail unless `len` bytes fit in the budget.
    pub(crate) fn check(&self, lua: &Lua, len: usize) -> mlua::Result<()> {
        if len > self.available(lua) {
            return Err(mlua::Error::runtime("resulting string is too long"));
        }
        Ok(())
    }
}

type Installer = fn(&Lua, &HostContext) -> mlua::Result<Table>;

/// One allow-listed module.
pub(crate) struct Capability {
    pub(crate) name: &'static str,
    pub(crate) install: Installer,
}

pub(crate) static CAPABILITIES: &[Capability] = &[
    Capability {
        name: "text",
        install: text::install,
    },
    Capability {
        name: "math",
        install: install_math,
    },
    Capability {
        name: "times",
        install: times::install,
    },
    Capability {
        name: "json",
        install: codec::install_json,
    },
    Capability {
        name: "base64",
        install: codec::install_base64,
    },
    Capability {
        name: "hex",
        install: codec::install_hex,
    },
    Capability {
        name: "fmt",
        install: fmt::install,
    },
    Capability {
        name: "log",
        install: log::install,
    },
    Capability {
        name: "http",
        install: http::install,
    },
    Capability {
        name: "cgi",
        install: cgi::install,
    },
];

/// Look up an allow-listed module by name.
pub(crate) fn lookup(name: &str) -> Option<&'static Capability> {
    CAPABILITIES.iter().find(|c| c.name == name)
}

pub(crate) fn is_builtin(name: &str) -> bool {
    lookup(name).is_some()
}

fn install_math(lua: &Lua, _ctx: &HostContext) -> mlua::Result<Table> {
    lua.globals().get::<Table>("math")
}

/// Read a Lua string argument as raw bytes.
pub(crate) fn bytes(value: &mlua::String) -> Vec<u8> {
    value.as_bytes().to_vec()
}
