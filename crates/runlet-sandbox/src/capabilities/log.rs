// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

use mlua::{Lua, Table};
use tracing::{debug, error, info, warn};

use super::HostContext;

#[derive(Clone, Copy)]
enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

pub(crate) fn install(lua: &Lua, ctx: &HostContext) -> mlua::Result<Table> {
    let log = lua.create_table()?;

    for (name, level) in [
        ("debug", Level::Debug),
        ("info", Level::Info),
        ("warn", Level::Warn),
        ("error", Level::Error),
    ] {
        let domain = ctx.domain.clone();
        let program = ctx.program.clone();
        log.set(
            name,
            lua.create_function(move |_, message: mlua::String| {
                let message = message.to_string_lossy().to_string();
                emit(level, &domain, &program, &message);
                Ok(())
            })?,
        )?;
    }

    Ok(log)
}

fn emit(level: Level, domain: &str, program: &str, message: &str) {
    match level {
        Level::Debug => debug!(target: "runlet_sandbox::script", domain, program, "{message}"),
        Level::Info => info!(target: "runlet_sandbox::script", domain, program, "{message}"),
        Level::Warn => warn!(target: "runlet_sandbox::script", domain, program, "{message}"),
        Level::Error => error!(target: "runlet_sandbox::script", domain, program, "{message}"),
    }
}
