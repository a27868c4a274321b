// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Access to tenant databases.
//!
//! The reconciler needs two things: the list of tenant domains
//! ([`TenantDirectory`]) and, per tenant, the latest revision of every routine
//! program ([`ProgramStore`]). [`PgProgramStore`] implements both on top of
//! PostgreSQL; [`MemoryProgramStore`] is used for tests and embedding.
//!
//! # PostgreSQL layout
//!
//! Control database:
//!
//! ```sql
//! CREATE TABLE tenants (
//!     domain       TEXT PRIMARY KEY,
//!     database_url TEXT NOT NULL
//! );
//! ```
//!
//! Tenant database (read only):
//!
//! ```sql
//! CREATE TABLE programs (
//!     uuid  UUID PRIMARY KEY,
//!     name  TEXT NOT NULL,
//!     type  TEXT NOT NULL          -- 'ordinary' | 'routine'
//! );
//!
//! CREATE TABLE program_revisions (
//!     program_uuid UUID   NOT NULL REFERENCES programs (uuid),
//!     revision     BIGINT NOT NULL,
//!     schedule     TEXT   NOT NULL DEFAULT '',
//!     deadline_ms  BIGINT NOT NULL,
//!     language     TEXT   NOT NULL,
//!     code         BYTEA  NOT NULL,
//!     PRIMARY KEY (program_uuid, revision)
//! );
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use tracing::debug;

use crate::program::{ProgramKind, ProgramRevision, checksum};

/// Errors reading tenant data.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Query or connection failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The tenant is not listed in the control database.
    #[error("unknown tenant: {0}")]
    UnknownTenant(String),

    /// The tenant database cannot be reached.
    #[error("tenant {0} is unavailable")]
    TenantUnavailable(String),

    /// A row could not be turned into a program revision.
    #[error("invalid program {program} in tenant {domain}: {reason}")]
    InvalidRow {
        /// Tenant domain.
        domain: String,
        /// Program id.
        program: String,
        /// What was wrong.
        reason: String,
    },
}

/// Lists tenant domains.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    /// Every tenant domain.
    async fn domains(&self) -> Result<Vec<String>, StoreError>;
}

/// Reads programs of one tenant.
#[async_trait]
pub trait ProgramStore: Send + Sync {
    /// Latest revision of every routine program of `domain`.
    async fn routines(&self, domain: &str) -> Result<Vec<ProgramRevision>, StoreError>;
}

/// In-memory tenant directory and program store.
#[derive(Debug, Default)]
pub struct MemoryProgramStore {
    tenants: RwLock<BTreeMap<String, Vec<ProgramRevision>>>,
    unavailable: RwLock<BTreeSet<String>>,
}

impl MemoryProgramStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tenant with no programs. No-op if it exists.
    pub fn add_tenant(&self, domain: impl Into<String>) {
        let mut tenants = self.tenants.write().unwrap_or_else(|e| e.into_inner());
        tenants.entry(domain.into()).or_default();
    }

    /// Remove a tenant and its programs.
    pub fn remove_tenant(&self, domain: &str) {
        let mut tenants = self.tenants.write().unwrap_or_else(|e| e.into_inner());
        tenants.remove(domain);
    }

    /// Insert or replace a program revision (keyed by program uuid).
    pub fn put(&self, program: ProgramRevision) {
        let mut tenants = self.tenants.write().unwrap_or_else(|e| e.into_inner());
        let programs = tenants.entry(program.domain.clone()).or_default();
        programs.retain(|p| p.program_uuid != program.program_uuid);
        programs.push(program);
    }

    /// Delete a program.
    pub fn delete(&self, domain: &str, program_uuid: &str) {
        let mut tenants = self.tenants.write().unwrap_or_else(|e| e.into_inner());
        if let Some(programs) = tenants.get_mut(domain) {
            programs.retain(|p| p.program_uuid != program_uuid);
        }
    }

    /// Make scans of `domain` fail (or succeed again).
    pub fn set_unavailable(&self, domain: &str, unavailable: bool) {
        let mut set = self.unavailable.write().unwrap_or_else(|e| e.into_inner());
        if unavailable {
            set.insert(domain.to_string());
        } else {
            set.remove(domain);
        }
    }
}

#[async_trait]
impl TenantDirectory for MemoryProgramStore {
    async fn domains(&self) -> Result<Vec<String>, StoreError> {
        let tenants = self.tenants.read().unwrap_or_else(|e| e.into_inner());
        Ok(tenants.keys().cloned().collect())
    }
}

#[async_trait]
impl ProgramStore for MemoryProgramStore {
    async fn routines(&self, domain: &str) -> Result<Vec<ProgramRevision>, StoreError> {
        if self
            .unavailable
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(domain)
        {
            return Err(StoreError::TenantUnavailable(domain.to_string()));
        }
        let tenants = self.tenants.read().unwrap_or_else(|e| e.into_inner());
        let programs = tenants
            .get(domain)
            .ok_or_else(|| StoreError::UnknownTenant(domain.to_string()))?;
        Ok(programs.iter().filter(|p| p.is_routine()).cloned().collect())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TenantRow {
    domain: String,
    database_url: String,
}

#[derive(Debug, sqlx::FromRow)]
struct RoutineRow {
    program_uuid: String,
    name: String,
    kind: String,
    revision: i64,
    schedule: String,
    deadline_ms: i64,
    language: String,
    code: Vec<u8>,
}

impl RoutineRow {
    fn into_revision(self, domain: &str) -> Result<ProgramRevision, StoreError> {
        let invalid = |reason: String| StoreError::InvalidRow {
            domain: domain.to_string(),
            program: self.program_uuid.clone(),
            reason,
        };
        let kind: ProgramKind = self.kind.parse().map_err(invalid)?;
        let deadline_ms = u64::try_from(self.deadline_ms)
            .map_err(|_| invalid(format!("negative deadline {}", self.deadline_ms)))?;

        Ok(ProgramRevision {
            domain: domain.to_string(),
            checksum: checksum(&self.code),
            program_uuid: self.program_uuid,
            revision: self.revision,
            name: self.name,
            kind,
            schedule: self.schedule,
            deadline: Duration::from_millis(deadline_ms),
            language: self.language,
            code: self.code,
        })
    }
}

const LATEST_ROUTINES: &str = r#"
    SELECT DISTINCT ON (p.uuid)
        p.uuid::text    AS program_uuid,
        p.name          AS name,
        p.type          AS kind,
        r.revision      AS revision,
        r.schedule      AS schedule,
        r.deadline_ms   AS deadline_ms,
        r.language      AS language,
        r.code          AS code
    FROM programs p
    JOIN program_revisions r ON r.program_uuid = p.uuid
    WHERE p.type = 'routine'
    ORDER BY p.uuid, r.revision DESC
"#;

/// PostgreSQL-backed tenant directory and program store.
///
/// Tenant pools are created lazily on first scan and reused afterwards.
pub struct PgProgramStore {
    control: PgPool,
    tenant_pools: RwLock<HashMap<String, PgPool>>,
    max_connections: u32,
}

impl PgProgramStore {
    /// Create a store reading the tenant list from `control`.
    pub fn new(control: PgPool) -> Self {
        Self {
            control,
            tenant_pools: RwLock::new(HashMap::new()),
            max_connections: 2,
        }
    }

    /// Cap on connections per tenant pool. Default: 2.
    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    async fn tenant_pool(&self, domain: &str) -> Result<PgPool, StoreError> {
        if let Some(pool) = self
            .tenant_pools
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(domain)
        {
            return Ok(pool.clone());
        }

        let row = sqlx::query_as::<_, TenantRow>(
            "SELECT domain, database_url FROM tenants WHERE domain = $1",
        )
        .bind(domain)
        .fetch_optional(&self.control)
        .await?
        .ok_or_else(|| StoreError::UnknownTenant(domain.to_string()))?;

        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .connect_lazy(&row.database_url)?;
        debug!(domain = %row.domain, "Created tenant pool");

        let mut pools = self.tenant_pools.write().unwrap_or_else(|e| e.into_inner());
        Ok(pools.entry(row.domain).or_insert(pool).clone())
    }
}

#[async_trait]
impl TenantDirectory for PgProgramStore {
    async fn domains(&self) -> Result<Vec<String>, StoreError> {
        let domains = sqlx::query_scalar::<_, String>("SELECT domain FROM tenants ORDER BY domain")
            .fetch_all(&self.control)
            .await?;
        Ok(domains)
    }
}

#[async_trait]
impl ProgramStore for PgProgramStore {
    async fn routines(&self, domain: &str) -> Result<Vec<ProgramRevision>, StoreError> {
        let pool = self.tenant_pool(domain).await?;
        let rows = sqlx::query_as::<_, RoutineRow>(LATEST_ROUTINES)
            .fetch_all(&pool)
            .await?;
        rows.into_iter().map(|r| r.into_revision(domain)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn routine(domain: &str, id: &str) -> ProgramRevision {
        ProgramRevision::routine(domain, id, 1, "@hourly", Duration::from_secs(1), "return 1")
    }

    #[tokio::test]
    async fn test_memory_store_lists_routines() {
        let store = MemoryProgramStore::new();
        store.put(routine("acme", "a"));
        let mut ordinary = routine("acme", "o");
        ordinary.kind = ProgramKind::Ordinary;
        store.put(ordinary);
        store.add_tenant("globex");

        assert_eq!(store.domains().await.unwrap(), vec!["acme", "globex"]);
        let routines = store.routines("acme").await.unwrap();
        assert_eq!(routines.len(), 1);
        assert_eq!(routines[0].program_uuid, "a");
        assert!(store.routines("globex").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_store_put_replaces() {
        let store = MemoryProgramStore::new();
        store.put(routine("acme", "a"));
        let mut next = routine("acme", "a");
        next.revision = 2;
        store.put(next);

        let routines = store.routines("acme").await.unwrap();
        assert_eq!(routines.len(), 1);
        assert_eq!(routines[0].revision, 2);
    }

    #[tokio::test]
    async fn test_memory_store_failures() {
        let store = MemoryProgramStore::new();
        store.add_tenant("acme");
        store.set_unavailable("acme", true);

        assert!(matches!(
            store.routines("acme").await,
            Err(StoreError::TenantUnavailable(_))
        ));
        assert!(matches!(
            store.routines("nobody").await,
            Err(StoreError::UnknownTenant(_))
        ));

        store.set_unavailable("acme", false);
        assert!(store.routines("acme").await.is_ok());
    }

    #[test]
    fn test_row_conversion() {
        let row = RoutineRow {
            program_uuid: "p".to_string(),
            name: "nightly".to_string(),
            kind: "routine".to_string(),
            revision: 7,
            schedule: "@daily".to_string(),
            deadline_ms: 2500,
            language: "lua".to_string(),
            code: b"return 1".to_vec(),
        };
        let program = row.into_revision("acme").unwrap();

        assert_eq!(program.key(), "acme/p");
        assert_eq!(program.deadline, Duration::from_millis(2500));
        assert_eq!(program.checksum, checksum(b"return 1"));
    }

    #[test]
    fn test_row_conversion_rejects_negative_deadline() {
        let row = RoutineRow {
            program_uuid: "p".to_string(),
            name: "broken".to_string(),
            kind: "routine".to_string(),
            revision: 1,
            schedule: String::new(),
            deadline_ms: -1,
            language: "lua".to_string(),
            code: vec![],
        };
        assert!(matches!(
            row.into_revision("acme"),
            Err(StoreError::InvalidRow { .. })
        ));
    }
}
