// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Restricted outbound HTTP client.
//!
//! Only `http` and `https` URLs are accepted and every request is bounded by
//! the time left before the program's deadline.

use std::collections::HashMap;

use mlua::{Lua, Table};
use reqwest::{Method, Url};
use tracing::debug;

use super::{HostContext, bytes};

/// Response bodies larger than this are rejected while streaming.
const MAX_RESPONSE_BYTES: usize = 8 * 1024 * 1024;

struct Fetched {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

pub(crate) fn install(lua: &Lua, ctx: &HostContext) -> mlua::Result<Table> {
    let http = lua.create_table()?;

    let get_ctx = ctx.clone();
    http.set(
        "get",
        lua.create_function(
            move |lua, (url, headers): (String, Option<HashMap<String, String>>)| {
                let fetched = fetch(&get_ctx, Method::GET, &url, headers, None)?;
                into_table(lua, fetched)
            },
        )?,
    )?;

    let post_ctx = ctx.clone();
    http.set(
        "post",
        lua.create_function(
            move |lua,
                  (url, body, headers): (
                String,
                mlua::String,
                Option<HashMap<String, String>>,
            )| {
                let fetched = fetch(&post_ctx, Method::POST, &url, headers, Some(bytes(&body)))?;
                into_table(lua, fetched)
            },
        )?,
    )?;

    Ok(http)
}

fn fetch(
    ctx: &HostContext,
    method: Method,
    url: &str,
    headers: Option<HashMap<String, String>>,
    body: Option<Vec<u8>>,
) -> mlua::Result<Fetched> {
    let url = Url::parse(url).map_err(|e| mlua::Error::runtime(format!("invalid url: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(mlua::Error::runtime(format!(
            "scheme '{}' is not allowed",
            url.scheme()
        )));
    }
    let timeout = ctx
        .remaining()
        .ok_or_else(|| mlua::Error::runtime("deadline exceeded"))?;

    debug!(domain = %ctx.domain, program = %ctx.program, %method, %url, "Script HTTP request");

    let mut request = ctx.http.request(method, url).timeout(timeout);
    for (name, value) in headers.unwrap_or_default() {
        request = request.header(name, value);
    }
    if let Some(body) = body {
        request = request.body(body);
    }

    ctx.handle.block_on(async move {
        let mut response = request.send().await.map_err(request_failed)?;
        if response
            .content_length()
            .is_some_and(|len| len > MAX_RESPONSE_BYTES as u64)
        {
            return Err(body_too_large());
        }

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(request_failed)? {
            if body.len() + chunk.len() > MAX_RESPONSE_BYTES {
                return Err(body_too_large());
            }
            body.extend_from_slice(&chunk);
        }

        Ok(Fetched {
            status,
            headers,
            body,
        })
    })
}

fn request_failed(e: reqwest::Error) -> mlua::Error {
    mlua::Error::runtime(format!("http request failed: {e}"))
}

fn body_too_large() -> mlua::Error {
    mlua::Error::runtime("http response body is too large")
}

fn into_table(lua: &Lua, fetched: Fetched) -> mlua::Result<Table> {
    let response = lua.create_table()?;
    response.set("status", fetched.status)?;
    response.set("body", lua.create_string(&fetched.body)?)?;

    let headers = lua.create_table()?;
    for (name, value) in fetched.headers {
        headers.set(name, value)?;
    }
    response.set("headers", headers)?;
    Ok(response)
}
