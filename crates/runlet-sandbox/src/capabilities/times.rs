// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, SecondsFormat, Utc};
use mlua::{Lua, Table};

use super::HostContext;

pub(crate) fn install(lua: &Lua, _ctx: &HostContext) -> mlua::Result<Table> {
    let times = lua.create_table()?;

    times.set(
        "now",
        lua.create_function(|_, ()| Ok(Utc::now().timestamp_micros() as f64 / 1_000_000.0))?,
    )?;
    times.set(
        "now_ms",
        lua.create_function(|_, ()| Ok(Utc::now().timestamp_millis()))?,
    )?;
    times.set(
        "format",
        lua.create_function(|_, (ts, pattern): (f64, Option<String>)| {
            format_timestamp(ts, pattern.as_deref()).map_err(mlua::Error::runtime)
        })?,
    )?;
    times.set(
        "parse",
        lua.create_function(|_, s: String| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.timestamp_micros() as f64 / 1_000_000.0)
                .map_err(|e| mlua::Error::runtime(format!("invalid RFC 3339 timestamp: {e}")))
        })?,
    )?;

    Ok(times)
}

fn format_timestamp(ts: f64, pattern: Option<&str>) -> Result<String, String> {
    let micros = (ts * 1_000_000.0).round() as i64;
    let dt = DateTime::<Utc>::from_timestamp_micros(micros)
        .ok_or_else(|| format!("timestamp {ts} is out of range"))?;

    match pattern {
        None => Ok(dt.to_rfc3339_opts(SecondsFormat::Secs, true)),
        Some(pattern) => {
            let items: Vec<Item<'_>> = StrftimeItems::new(pattern).collect();
            if items.iter().any(|item| matches!(item, Item::Error)) {
                return Err(format!("invalid format pattern '{pattern}'"));
            }
            Ok(dt.format_with_items(items.into_iter()).to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(
            format_timestamp(784111777.0, None).unwrap(),
            "1994-11-06T08:49:37Z"
        );
        assert_eq!(
            format_timestamp(784111777.0, Some("%Y/%m/%d")).unwrap(),
            "1994/11/06"
        );
        assert!(format_timestamp(0.0, Some("%Q")).is_err());
    }
}
