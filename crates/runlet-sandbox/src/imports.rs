// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Import scanning and named-module resolution.

use std::collections::HashMap;
use std::fmt;
use std::sync::{LazyLock, RwLock};

use async_trait::async_trait;
use regex::Regex;
use thiserror::Error;

use crate::error::SandboxError;

static REQUIRE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\brequire\s*\(?\s*"(\d+)""#).expect("valid regex"));

/// Collect the literal `require` targets of a Lua chunk, in order of first use.
///
/// Comments are dropped and string literals are masked before matching, so
/// neither a commented-out import nor `require` text inside a string counts.
pub fn scan_imports(source: &str) -> Vec<String> {
    let (masked, literals) = mask_source(source);

    let mut seen = Vec::new();
    for cap in REQUIRE.captures_iter(&masked) {
        let Some(import) = cap[1].parse::<usize>().ok().and_then(|n| literals.get(n)) else {
            continue;
        };
        if import.is_empty() || import.contains(char::is_whitespace) {
            continue;
        }
        if !seen.contains(import) {
            seen.push(import.clone());
        }
    }
    seen
}

/// Strip comments and replace every string literal with `"<index>"`.
///
/// Returns the masked source and the raw literal contents by index.
fn mask_source(source: &str) -> (String, Vec<String>) {
    let bytes = source.as_bytes();
    let mut masked = String::with_capacity(source.len());
    let mut literals = Vec::new();
    let mut copied = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                masked.push_str(&source[copied..i]);
                masked.push(' ');
                let end = match long_bracket(bytes, i + 2) {
                    Some(level) => close_bracket(bytes, i + 2 + level + 2, level)
                        .map_or(bytes.len(), |(_, after)| after),
                    None => bytes[i..]
                        .iter()
                        .position(|&b| b == b'\n')
                        .map_or(bytes.len(), |p| i + p),
                };
                i = end;
                copied = end;
            }
            quote @ (b'"' | b'\'') => {
                let start = i + 1;
                let mut j = start;
                while j < bytes.len() && bytes[j] != quote && bytes[j] != b'\n' {
                    if bytes[j] == b'\\' {
                        j += 1;
                    }
                    j += 1;
                }
                let end = j.min(bytes.len());
                masked.push_str(&source[copied..i]);
                push_literal(&mut masked, &mut literals, &source[start..end]);
                i = (end + 1).min(bytes.len());
                copied = i;
            }
            b'[' => match long_bracket(bytes, i) {
                Some(level) => {
                    let start = i + level + 2;
                    let (end, after) =
                        close_bracket(bytes, start, level).unwrap_or((bytes.len(), bytes.len()));
                    masked.push_str(&source[copied..i]);
                    push_literal(&mut masked, &mut literals, &source[start..end]);
                    i = after;
                    copied = after;
                }
                None => i += 1,
            },
            _ => i += 1,
        }
    }
    masked.push_str(&source[copied..]);
    (masked, literals)
}

fn push_literal(masked: &mut String, literals: &mut Vec<String>, content: &str) {
    masked.push_str(&format!("\"{}\"", literals.len()));
    literals.push(content.to_string());
}

/// Level of a long bracket (`[[`, `[=[`, ...) opening at `at`.
fn long_bracket(bytes: &[u8], at: usize) -> Option<usize> {
    if bytes.get(at) != Some(&b'[') {
        return None;
    }
    let level = bytes[at + 1..].iter().take_while(|&&b| b == b'=').count();
    (bytes.get(at + 1 + level) == Some(&b'[')).then_some(level)
}

/// Find the long bracket of `level` closing after `from`: (content end, next byte).
fn close_bracket(bytes: &[u8], from: usize, level: usize) -> Option<(usize, usize)> {
    let mut i = from;
    while i < bytes.len() {
        if bytes[i] == b']' {
            let equals = bytes[i + 1..].iter().take_while(|&&b| b == b'=').count();
            if equals == level && bytes.get(i + 1 + level) == Some(&b']') {
                return Some((i, i + level + 2));
            }
        }
        i += 1;
    }
    None
}

/// Requested revision of a named module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Revision {
    /// Whatever the module index considers current.
    Latest,
    /// A pinned revision number.
    Number(u64),
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Revision::Latest => f.write_str("latest"),
            Revision::Number(n) => write!(f, "{n}"),
        }
    }
}

/// A parsed `require` argument: `name` or `name@revision`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSpec {
    /// Module name.
    pub name: String,
    /// Requested revision; `None` when no suffix was written.
    pub revision: Option<Revision>,
}

impl ImportSpec {
    /// Parse an import string.
    pub fn parse(import: &str) -> Result<Self, SandboxError> {
        let malformed = |reason: &str| SandboxError::MalformedImport {
            import: import.to_string(),
            reason: reason.to_string(),
        };

        let (name, revision) = match import.split_once('@') {
            None => (import, None),
            Some((name, "latest")) => (name, Some(Revision::Latest)),
            Some((name, rev)) => {
                let n = rev
                    .parse::<u64>()
                    .map_err(|_| malformed("revision must be a number or 'latest'"))?;
                (name, Some(Revision::Number(n)))
            }
        };

        if name.is_empty() {
            return Err(malformed("module name is empty"));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/'))
        {
            return Err(malformed("module name contains invalid characters"));
        }

        Ok(Self {
            name: name.to_string(),
            revision,
        })
    }

    /// Revision to request from the module index.
    pub fn effective_revision(&self) -> Revision {
        self.revision.unwrap_or(Revision::Latest)
    }
}

/// Identity of a named module in the module index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleRef {
    /// Owning tenant domain.
    pub domain: String,
    /// Module name.
    pub name: String,
    /// Requested revision.
    pub revision: Revision,
    /// Module language.
    pub language: String,
}

impl ModuleRef {
    /// Cache identity: `language:domain/name@revision`.
    pub fn cache_key(&self) -> String {
        format!(
            "{}:{}/{}@{}",
            self.language, self.domain, self.name, self.revision
        )
    }
}

impl fmt::Display for ModuleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cache_key())
    }
}

/// Failure to resolve a named module.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    /// The index has no such module.
    #[error("module {0} not found")]
    NotFound(String),

    /// The index answered with an unexpected status.
    #[error("module index returned status {status} for {module}")]
    Upstream {
        /// Module cache key.
        module: String,
        /// HTTP status code.
        status: u16,
    },

    /// The index could not be reached.
    #[error("module index unreachable: {0}")]
    Transport(String),
}

/// Source of named modules used during compilation.
#[async_trait]
pub trait ModuleResolver: Send + Sync {
    /// Fetch the code of a module.
    async fn resolve(&self, module: &ModuleRef) -> Result<Vec<u8>, ResolveError>;
}

/// Resolver that knows no modules. Every named import fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoResolver;

#[async_trait]
impl ModuleResolver for NoResolver {
    async fn resolve(&self, module: &ModuleRef) -> Result<Vec<u8>, ResolveError> {
        Err(ResolveError::NotFound(module.cache_key()))
    }
}

/// In-memory resolver keyed by `(domain, name)`.
///
/// Revisions are ignored. Useful for tests and embedded setups.
#[derive(Debug, Default)]
pub struct StaticResolver {
    modules: RwLock<HashMap<(String, String), Vec<u8>>>,
}

impl StaticResolver {
    /// Create an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a module.
    pub fn insert(&self, domain: &str, name: &str, code: impl Into<Vec<u8>>) {
        let mut modules = self.modules.write().unwrap_or_else(|e| e.into_inner());
        modules.insert((domain.to_string(), name.to_string()), code.into());
    }
}

#[async_trait]
impl ModuleResolver for StaticResolver {
    async fn resolve(&self, module: &ModuleRef) -> Result<Vec<u8>, ResolveError> {
        let modules = self.modules.read().unwrap_or_else(|e| e.into_inner());
        modules
            .get(&(module.domain.clone(), module.name.clone()))
            .cloned()
            .ok_or_else(|| ResolveError::NotFound(module.cache_key()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_imports() {
        let source = r#"
            local text = require("text")
            local json = require 'json'
            local lib = require("shared@3")
            -- local os = require("os")
            --[[ require("io") ]]
            local again = require("text")
        "#;
        assert_eq!(scan_imports(source), vec!["text", "json", "shared@3"]);
    }

    #[test]
    fn test_scan_ignores_similar_names() {
        assert!(scan_imports("local x = prerequire('a')").is_empty());
    }

    #[test]
    fn test_scan_comment_marker_inside_string() {
        let source = r#"local sep = "--" local text = require("text")"#;
        assert_eq!(scan_imports(source), vec!["text"]);

        let escaped = r#"local s = "a\"--" .. require('hex')"#;
        assert_eq!(scan_imports(escaped), vec!["hex"]);
    }

    #[test]
    fn test_scan_ignores_require_inside_strings() {
        let source = r#"
            local doc = "call require('os') to crash"
            local long = [==[ require("io") ]==]
            local json = require [[json]]
            --[==[ require("debug") ]==]
        "#;
        assert_eq!(scan_imports(source), vec!["json"]);
    }

    #[test]
    fn test_scan_unterminated_input() {
        assert!(scan_imports("local s = 'require(\"os\")").is_empty());
        assert!(scan_imports("--[[ require('os')").is_empty());
        assert_eq!(scan_imports("require('text') local s = [["), vec!["text"]);
    }

    #[test]
    fn test_parse_import_spec() {
        let plain = ImportSpec::parse("shared").unwrap();
        assert_eq!(plain.revision, None);
        assert_eq!(plain.effective_revision(), Revision::Latest);

        let pinned = ImportSpec::parse("shared@12").unwrap();
        assert_eq!(pinned.name, "shared");
        assert_eq!(pinned.revision, Some(Revision::Number(12)));

        let latest = ImportSpec::parse("shared@latest").unwrap();
        assert_eq!(latest.revision, Some(Revision::Latest));
    }

    #[test]
    fn test_parse_import_spec_malformed() {
        for bad in ["shared@v2", "shared@", "@3", "sh ared", "a@1@2"] {
            let err = ImportSpec::parse(bad).unwrap_err();
            assert_eq!(err.error_code(), "MALFORMED_IMPORT", "{bad}");
        }
    }

    #[test]
    fn test_module_cache_key() {
        let module = ModuleRef {
            domain: "acme".into(),
            name: "shared".into(),
            revision: Revision::Number(4),
            language: "lua".into(),
        };
        assert_eq!(module.cache_key(), "lua:acme/shared@4");
    }

    #[tokio::test]
    async fn test_static_resolver() {
        let resolver = StaticResolver::new();
        resolver.insert("acme", "shared", "return {}");

        let mut module = ModuleRef {
            domain: "acme".into(),
            name: "shared".into(),
            revision: Revision::Latest,
            language: "lua".into(),
        };
        assert_eq!(resolver.resolve(&module).await.unwrap(), b"return {}");

        module.domain = "other".into();
        assert!(matches!(
            resolver.resolve(&module).await,
            Err(ResolveError::NotFound(_))
        ));
    }
}
