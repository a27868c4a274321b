// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! `json`, `base64` and `hex` modules.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use mlua::{Lua, LuaSerdeExt, Table, Value};

use super::{HostContext, bytes};

pub(crate) fn install_json(lua: &Lua, _ctx: &HostContext) -> mlua::Result<Table> {
    let json = lua.create_table()?;

    json.set(
        "encode",
        lua.create_function(|lua, value: Value| {
            let value: serde_json::Value = lua.from_value(value)?;
            serde_json::to_string(&value).map_err(mlua::Error::external)
        })?,
    )?;
    json.set(
        "decode",
        lua.create_function(|lua, s: mlua::String| {
            let value: serde_json::Value =
                serde_json::from_slice(&bytes(&s)).map_err(mlua::Error::external)?;
            lua.to_value(&value)
        })?,
    )?;
    json.set("null", lua.null())?;

    Ok(json)
}

pub(crate) fn install_base64(lua: &Lua, _ctx: &HostContext) -> mlua::Result<Table> {
    let base64 = lua.create_table()?;

    base64.set(
        "encode",
        lua.create_function(|_, s: mlua::String| Ok(STANDARD.encode(bytes(&s))))?,
    )?;
    base64.set(
        "decode",
        lua.create_function(|lua, s: mlua::String| {
            let decoded = STANDARD.decode(bytes(&s)).map_err(mlua::Error::external)?;
            lua.create_string(&decoded)
        })?,
    )?;

    Ok(base64)
}

pub(crate) fn install_hex(lua: &Lua, _ctx: &HostContext) -> mlua::Result<Table> {
    let hex = lua.create_table()?;

    hex.set(
        "encode",
        lua.create_function(|_, s: mlua::String| Ok(hex::encode(bytes(&s))))?,
    )?;
    hex.set(
        "decode",
        lua.create_function(|lua, s: mlua::String| {
            let decoded = hex::decode(bytes(&s)).map_err(mlua::Error::external)?;
            lua.create_string(&decoded)
        })?,
    )?;

    Ok(hex)
}
