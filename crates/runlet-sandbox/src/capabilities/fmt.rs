// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

use mlua::{Function, Lua, MultiValue, Table};

use super::HostContext;

pub(crate) fn install(lua: &Lua, ctx: &HostContext) -> mlua::Result<Table> {
    let fmt = lua.create_table()?;
    let budget = ctx.output_budget();

    fmt.set(
        "sprintf",
        lua.create_function(|lua, args: MultiValue| {
            let format: Function = lua.globals().get::<Table>("string")?.get("format")?;
            format.call::<mlua::String>(args)
        })?,
    )?;
    fmt.set(
        "sprint",
        lua.create_function(move |lua, args: MultiValue| {
            let tostring: Function = lua.globals().get("tostring")?;
            let mut parts = Vec::with_capacity(args.len());
            let mut len = args.len().saturating_sub(1);
            for arg in args {
                let s: mlua::String = tostring.call(arg)?;
                len = len.saturating_add(s.as_bytes().len());
                parts.push(s);
            }
            budget.check(lua, len)?;

            let mut out = Vec::with_capacity(len);
            for (i, part) in parts.iter().enumerate() {
                if i > 0 {
                    out.push(b' ');
                }
                out.extend_from_slice(&part.as_bytes());
            }
            lua.create_string(&out)
        })?,
    )?;

    Ok(fmt)
}
