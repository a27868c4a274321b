// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Named-module resolution for compilation.
//!
//! [`LibraryClient`] fetches module code from the module index
//! (`GET /v1/library`). [`ModuleCache`] wraps any resolver with a TTL cache
//! keyed by `language:domain/name@revision`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use runlet_sandbox::{ModuleRef, ModuleResolver, ResolveError};
use tracing::{debug, warn};

use crate::ttl_cache::TtlCache;

/// HTTP client for the module index.
#[derive(Debug, Clone)]
pub struct LibraryClient {
    http: reqwest::Client,
    base_url: String,
}

impl LibraryClient {
    /// Create a client for the index at `base_url` (e.g. `http://library:8070`).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Create a client reusing an existing connection pool.
    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ModuleResolver for LibraryClient {
    async fn resolve(&self, module: &ModuleRef) -> Result<Vec<u8>, ResolveError> {
        let revision = module.revision.to_string();
        let response = self
            .http
            .get(format!("{}/v1/library", self.base_url))
            .query(&[
                ("domain", module.domain.as_str()),
                ("module", module.name.as_str()),
                ("language", module.language.as_str()),
                ("revision", revision.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ResolveError::Transport(e.to_string()))?;

        match response.status() {
            StatusCode::OK => {
                let body = response
                    .bytes()
                    .await
                    .map_err(|e| ResolveError::Transport(e.to_string()))?;
                Ok(body.to_vec())
            }
            StatusCode::NOT_FOUND => Err(ResolveError::NotFound(module.cache_key())),
            status => Err(ResolveError::Upstream {
                module: module.cache_key(),
                status: status.as_u16(),
            }),
        }
    }
}

/// TTL cache in front of a module resolver.
pub struct ModuleCache {
    upstream: Arc<dyn ModuleResolver>,
    modules: TtlCache<String, Arc<Vec<u8>>>,
    lifetime: Duration,
}

impl ModuleCache {
    /// Cache modules fetched from `upstream` for `lifetime`.
    pub fn new(upstream: Arc<dyn ModuleResolver>, lifetime: Duration) -> Self {
        Self {
            upstream,
            modules: TtlCache::new(),
            lifetime,
        }
    }

    /// Number of cached modules.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether no module is cached.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

#[async_trait]
impl ModuleResolver for ModuleCache {
    async fn resolve(&self, module: &ModuleRef) -> Result<Vec<u8>, ResolveError> {
        let key = module.cache_key();
        if let Some(code) = self.modules.get(&key) {
            debug!(module = %key, "Module cache hit");
            return Ok(code.as_ref().clone());
        }

        let code = match self.upstream.resolve(module).await {
            Ok(code) => code,
            Err(e @ ResolveError::NotFound(_)) => return Err(e),
            Err(e) => {
                warn!(module = %key, error = %e, "Module resolution failed");
                return Err(e);
            }
        };

        if !self.lifetime.is_zero() {
            self.modules
                .insert(key, Arc::new(code.clone()), self.lifetime);
        }
        Ok(code)
    }
}
