// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Program revisions as read from tenant databases.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use runlet_protocol::Task;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Kind of a stored program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgramKind {
    /// Runs only when submitted explicitly.
    Ordinary,
    /// Runs on a schedule.
    Routine,
}

impl ProgramKind {
    /// Name used in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgramKind::Ordinary => "ordinary",
            ProgramKind::Routine => "routine",
        }
    }
}

impl fmt::Display for ProgramKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProgramKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ordinary" => Ok(ProgramKind::Ordinary),
            "routine" => Ok(ProgramKind::Routine),
            other => Err(format!("unknown program kind '{other}'")),
        }
    }
}

/// One revision of a tenant program.
///
/// Equality covers every field, so two scans of an unchanged revision compare
/// equal and any edit (code, schedule, deadline...) compares different.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramRevision {
    /// Owning tenant domain.
    pub domain: String,
    /// Program id within the tenant.
    pub program_uuid: String,
    /// Revision number, increasing per program.
    pub revision: i64,
    /// Display name.
    pub name: String,
    /// Ordinary or routine.
    pub kind: ProgramKind,
    /// Schedule expression (routines only).
    pub schedule: String,
    /// Execution deadline.
    pub deadline: Duration,
    /// Source language.
    pub language: String,
    /// Source code.
    pub code: Vec<u8>,
    /// SHA-256 of `code`, hex encoded.
    pub checksum: String,
}

impl ProgramRevision {
    /// Build a routine revision, computing its checksum.
    pub fn routine(
        domain: impl Into<String>,
        program_uuid: impl Into<String>,
        revision: i64,
        schedule: impl Into<String>,
        deadline: Duration,
        code: impl Into<Vec<u8>>,
    ) -> Self {
        let code = code.into();
        let program_uuid = program_uuid.into();
        Self {
            domain: domain.into(),
            name: program_uuid.clone(),
            program_uuid,
            revision,
            kind: ProgramKind::Routine,
            schedule: schedule.into(),
            deadline,
            language: "lua".to_string(),
            checksum: checksum(&code),
            code,
        }
    }

    /// Set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the source language.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Cache identity: `domain/program_uuid`.
    pub fn key(&self) -> String {
        format!("{}/{}", self.domain, self.program_uuid)
    }

    /// Whether the program carries a trigger.
    pub fn is_routine(&self) -> bool {
        self.kind == ProgramKind::Routine
    }

    /// The task submitted to a worker on each firing.
    pub fn to_task(&self) -> Task {
        Task::new(
            self.domain.clone(),
            self.program_uuid.clone(),
            self.language.clone(),
            self.deadline,
            &self.code,
        )
    }
}

/// SHA-256 of `code`, hex encoded.
pub fn checksum(code: &[u8]) -> String {
    hex::encode(Sha256::digest(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hourly(code: &str) -> ProgramRevision {
        ProgramRevision::routine("acme", "p", 1, "@hourly", Duration::from_secs(1), code)
    }

    #[test]
    fn test_equality_is_structural() {
        let a = hourly("return 1");
        let b = a.clone();
        assert_eq!(a, b);

        let mut changed = a.clone();
        changed.schedule = "@daily".to_string();
        assert_ne!(a, changed);

        let recoded = hourly("return 2");
        assert_ne!(a.checksum, recoded.checksum);
        assert_ne!(a, recoded);
    }

    #[test]
    fn test_to_task() {
        let program = ProgramRevision::routine(
            "acme",
            "p",
            4,
            "@every 5s",
            Duration::from_millis(750),
            "return 1",
        );
        let task = program.to_task();

        assert_eq!(task.program_key(), "acme/p");
        assert_eq!(task.deadline(), Duration::from_millis(750));
        assert_eq!(task.language, "lua");
        assert_eq!(task.decode_source().unwrap(), b"return 1");
    }

    #[test]
    fn test_kind_round_trip() {
        assert_eq!("routine".parse::<ProgramKind>(), Ok(ProgramKind::Routine));
        assert_eq!(ProgramKind::Ordinary.to_string(), "ordinary");
        assert!("cron".parse::<ProgramKind>().is_err());
    }
}
