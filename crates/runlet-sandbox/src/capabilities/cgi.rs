// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! `cgi` module: read-only request accessors, write-only response accessors.

use std::sync::{Arc, Mutex, MutexGuard};

use mlua::{Lua, Table};

use super::{HostContext, bytes};
use crate::cgi::CgiExchange;
use crate::error::SandboxError;

pub(crate) fn install(lua: &Lua, ctx: &HostContext) -> mlua::Result<Table> {
    let Some(exchange) = ctx.cgi.clone() else {
        return Err(mlua::Error::runtime(SandboxError::CgiUnsupported));
    };
    let cgi = lua.create_table()?;

    let ex = exchange.clone();
    cgi.set(
        "method",
        lua.create_function(move |_, ()| Ok(lock(&ex).request.method.clone()))?,
    )?;
    let ex = exchange.clone();
    cgi.set(
        "path",
        lua.create_function(move |_, ()| Ok(lock(&ex).request.path.clone()))?,
    )?;
    let ex = exchange.clone();
    cgi.set(
        "header",
        lua.create_function(move |_, name: String| {
            Ok(lock(&ex).request.header(&name).map(str::to_string))
        })?,
    )?;
    let ex = exchange.clone();
    cgi.set(
        "headers",
        lua.create_function(move |lua, ()| {
            let headers = lua.create_table()?;
            for (name, values) in &lock(&ex).request.headers {
                headers.set(name.as_str(), values.join(", "))?;
            }
            Ok(headers)
        })?,
    )?;
    let ex = exchange.clone();
    cgi.set(
        "body",
        lua.create_function(move |lua, ()| lua.create_string(&lock(&ex).request.body))?,
    )?;

    let ex = exchange.clone();
    cgi.set(
        "status",
        lua.create_function(move |_, code: u16| {
            if !(100..=599).contains(&code) {
                return Err(mlua::Error::runtime(format!("invalid status code {code}")));
            }
            lock(&ex).response.status = code;
            Ok(())
        })?,
    )?;
    let ex = exchange.clone();
    cgi.set(
        "header_set",
        lua.create_function(move |_, (name, value): (String, String)| {
            lock(&ex).response.set_header(&name, &value);
            Ok(())
        })?,
    )?;
    let ex = exchange;
    cgi.set(
        "write",
        lua.create_function(move |_, chunk: mlua::String| {
            lock(&ex).response.body.extend_from_slice(&bytes(&chunk));
            Ok(())
        })?,
    )?;

    Ok(cgi)
}

fn lock(exchange: &Arc<Mutex<CgiExchange>>) -> MutexGuard<'_, CgiExchange> {
    exchange.lock().unwrap_or_else(|e| e.into_inner())
}
