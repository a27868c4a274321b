// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

use mlua::{Lua, Table};

use super::{HostContext, OutputBudget};

pub(crate) fn install(lua: &Lua, ctx: &HostContext) -> mlua::Result<Table> {
    let text = lua.create_table()?;
    let budget = ctx.output_budget();

    text.set(
        "split",
        lua.create_function(move |lua, (s, sep): (String, String)| {
            let parts = if sep.is_empty() {
                s.chars().count()
            } else {
                s.matches(sep.as_str()).count() + 1
            };
            budget.check(
                lua,
                parts
                    .saturating_mul(std::mem::size_of::<String>())
                    .saturating_add(s.len()),
            )?;
            let parts: Vec<String> = if sep.is_empty() {
                s.chars().map(String::from).collect()
            } else {
                s.split(sep.as_str()).map(String::from).collect()
            };
            lua.create_sequence_from(parts)
        })?,
    )?;
    text.set(
        "join",
        lua.create_function(move |lua, (parts, sep): (Table, Option<mlua::String>)| {
            join(lua, budget, &parts, sep.as_ref().map(|s| s.as_bytes().to_vec()))
        })?,
    )?;
    text.set(
        "trim",
        lua.create_function(|_, s: String| Ok(s.trim().to_string()))?,
    )?;
    text.set(
        "contains",
        lua.create_function(|_, (s, needle): (String, String)| Ok(s.contains(&needle)))?,
    )?;
    text.set(
        "has_prefix",
        lua.create_function(|_, (s, prefix): (String, String)| Ok(s.starts_with(&prefix)))?,
    )?;
    text.set(
        "has_suffix",
        lua.create_function(|_, (s, suffix): (String, String)| Ok(s.ends_with(&suffix)))?,
    )?;
    text.set(
        "replace",
        lua.create_function(move |lua, (s, from, to): (String, String, String)| {
            if from.is_empty() {
                return Ok(s);
            }
            budget.check(lua, replaced_len(&s, &from, &to))?;
            Ok(s.replace(&from, &to))
        })?,
    )?;
    text.set(
        "upper",
        lua.create_function(|_, s: String| Ok(s.to_uppercase()))?,
    )?;
    text.set(
        "lower",
        lua.create_function(|_, s: String| Ok(s.to_lowercase()))?,
    )?;
    text.set(
        "rep",
        lua.create_function(move |lua, (s, n): (String, usize)| {
            budget.check(lua, s.len().saturating_mul(n))?;
            Ok(s.repeat(n))
        })?,
    )?;
    text.set(
        "pad_left",
        lua.create_function(
            move |lua, (s, width, fill): (String, usize, Option<String>)| {
                pad(lua, budget, &s, width, fill.as_deref(), true)
            },
        )?,
    )?;
    text.set(
        "pad_right",
        lua.create_function(
            move |lua, (s, width, fill): (String, usize, Option<String>)| {
                pad(lua, budget, &s, width, fill.as_deref(), false)
            },
        )?,
    )?;

    Ok(text)
}

/// Length of `s` after replacing every `from` with `to`.
fn replaced_len(s: &str, from: &str, to: &str) -> usize {
    let matches = s.matches(from).count();
    (s.len() - matches * from.len()).saturating_add(matches.saturating_mul(to.len()))
}

fn join(
    lua: &Lua,
    budget: OutputBudget,
    parts: &Table,
    sep: Option<Vec<u8>>,
) -> mlua::Result<mlua::String> {
    let sep = sep.unwrap_or_default();
    let count = parts.raw_len();

    // Sized from borrowed Lua strings before anything is copied to the host.
    let mut len = sep.len().saturating_mul(count.saturating_sub(1));
    for part in parts.clone().sequence_values::<mlua::String>() {
        len = len.saturating_add(part?.as_bytes().len());
    }
    budget.check(lua, len)?;

    let mut out = Vec::with_capacity(len);
    for (i, part) in parts.clone().sequence_values::<mlua::String>().enumerate() {
        if i > 0 {
            out.extend_from_slice(&sep);
        }
        out.extend_from_slice(&part?.as_bytes());
    }
    lua.create_string(&out)
}

fn pad(
    lua: &Lua,
    budget: OutputBudget,
    s: &str,
    width: usize,
    fill: Option<&str>,
    left: bool,
) -> mlua::Result<String> {
    let fill = fill.and_then(|f| f.chars().next()).unwrap_or(' ');
    let len = s.chars().count();
    if len >= width {
        return Ok(s.to_string());
    }
    budget.check(
        lua,
        (width - len)
            .saturating_mul(fill.len_utf8())
            .saturating_add(s.len()),
    )?;
    let padding: String = std::iter::repeat_n(fill, width - len).collect();
    Ok(if left {
        padding + s
    } else {
        format!("{s}{padding}")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn budget(memory_limit: usize) -> OutputBudget {
        OutputBudget { memory_limit }
    }

    #[test]
    fn test_pad() {
        let lua = Lua::new();
        let b = budget(64 * 1024 * 1024);
        assert_eq!(pad(&lua, b, "7", 3, Some("0"), true).unwrap(), "007");
        assert_eq!(pad(&lua, b, "ab", 4, None, false).unwrap(), "ab  ");
        assert_eq!(pad(&lua, b, "abcdef", 3, None, true).unwrap(), "abcdef");
        assert!(pad(&lua, budget(1024 * 1024), "a", 2 * 1024 * 1024, None, true).is_err());
    }

    #[test]
    fn test_replaced_len() {
        assert_eq!(replaced_len("banana", "an", "AN"), "banana".len());
        assert_eq!(replaced_len("aaa", "a", "bb"), 6);
        assert_eq!(replaced_len("a-b", "-", ""), 2);
        assert_eq!(replaced_len("abc", "x", "yy"), 3);
    }
}
