// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Manager-side program cache.
//!
//! Holds the routine revisions currently scheduled, each with its trigger.
//! Reconciliation is mark-and-sweep over a tagged `seen` flag:
//!
//! ```text
//! begin()            every entry -> unseen, pass opens
//! observe(program)   absent    -> insert, start trigger
//!                    identical -> seen
//!                    different -> stop old trigger, replace, start new
//! retain_domain(d)   every entry of d -> seen (its scan failed)
//! commit()           stop and remove unseen entries, pass closes
//! ```

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::program::ProgramRevision;
use crate::trigger::{Trigger, TriggerLauncher};

/// Errors from the reconciliation protocol.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReconcileError {
    /// `begin` was called while a pass was already open.
    #[error("a reconciliation pass is already in progress")]
    PassInProgress,

    /// `commit` was called without an open pass.
    #[error("no reconciliation pass is open")]
    NoPassOpen,
}

/// Result of observing one program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// The program was not cached.
    Added,
    /// The cached revision differed and was replaced.
    Replaced,
    /// The cached revision is identical.
    Unchanged,
}

/// Counts of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    /// New programs.
    pub added: usize,
    /// Changed programs.
    pub replaced: usize,
    /// Programs seen unchanged.
    pub unchanged: usize,
    /// Programs that vanished.
    pub removed: usize,
}

struct Entry {
    program: ProgramRevision,
    trigger: Option<Trigger>,
    seen: bool,
}

#[derive(Default)]
struct State {
    entries: HashMap<String, Entry>,
    pass: Option<ReconcileSummary>,
}

/// Cache of scheduled routines keyed by `domain/program_uuid`.
pub struct ProgramCache {
    state: RwLock<State>,
    launcher: Arc<dyn TriggerLauncher>,
}

impl ProgramCache {
    /// Create an empty cache starting triggers through `launcher`.
    pub fn new(launcher: Arc<dyn TriggerLauncher>) -> Self {
        Self {
            state: RwLock::new(State::default()),
            launcher,
        }
    }

    /// Open a pass, marking every entry unseen.
    pub fn begin(&self) -> Result<(), ReconcileError> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if state.pass.is_some() {
            return Err(ReconcileError::PassInProgress);
        }
        for entry in state.entries.values_mut() {
            entry.seen = false;
        }
        state.pass = Some(ReconcileSummary::default());
        Ok(())
    }

    /// Record that `program` exists in its tenant database.
    pub fn observe(&self, program: ProgramRevision) -> Observation {
        let key = program.key();
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());

        let observation = match state.entries.get_mut(&key) {
            Some(entry) if entry.program == program => {
                entry.seen = true;
                Observation::Unchanged
            }
            Some(entry) => {
                if let Some(trigger) = entry.trigger.take() {
                    trigger.stop();
                }
                debug!(
                    program = %key,
                    from = entry.program.revision,
                    to = program.revision,
                    "Routine changed"
                );
                entry.trigger = self.start(&program);
                entry.program = program;
                entry.seen = true;
                Observation::Replaced
            }
            None => {
                let trigger = self.start(&program);
                state.entries.insert(
                    key,
                    Entry {
                        program,
                        trigger,
                        seen: true,
                    },
                );
                Observation::Added
            }
        };

        if let Some(pass) = state.pass.as_mut() {
            match observation {
                Observation::Added => pass.added += 1,
                Observation::Replaced => pass.replaced += 1,
                Observation::Unchanged => pass.unchanged += 1,
            }
        }
        observation
    }

    /// Keep every entry of `domain` for this pass.
    ///
    /// Used when the tenant's scan failed, so a transient outage does not
    /// tear down its schedule.
    pub fn retain_domain(&self, domain: &str) -> usize {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let mut retained = 0;
        for entry in state
            .entries
            .values_mut()
            .filter(|e| e.program.domain == domain)
        {
            entry.seen = true;
            retained += 1;
        }
        retained
    }

    /// Stop and remove every unseen entry and close the pass.
    pub fn commit(&self) -> Result<ReconcileSummary, ReconcileError> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let mut summary = state.pass.take().ok_or(ReconcileError::NoPassOpen)?;

        state.entries.retain(|key, entry| {
            if entry.seen {
                return true;
            }
            if let Some(trigger) = &entry.trigger {
                trigger.stop();
            }
            debug!(program = %key, "Routine removed");
            summary.removed += 1;
            false
        });
        Ok(summary)
    }

    /// Whether a pass is open.
    pub fn in_pass(&self) -> bool {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.pass.is_some()
    }

    /// Cached revision of a program.
    pub fn get(&self, key: &str) -> Option<ProgramRevision> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.entries.get(key).map(|e| e.program.clone())
    }

    /// Whether the program has a running trigger.
    pub fn is_triggered(&self, key: &str) -> bool {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state
            .entries
            .get(key)
            .and_then(|e| e.trigger.as_ref())
            .is_some_and(|t| !t.is_stopped())
    }

    /// Number of cached programs.
    pub fn len(&self) -> usize {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.entries.len()
    }

    /// Whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop every trigger and empty the cache.
    pub fn stop_all(&self) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        for entry in state.entries.values() {
            if let Some(trigger) = &entry.trigger {
                trigger.stop();
            }
        }
        state.entries.clear();
        state.pass = None;
    }

    fn start(&self, program: &ProgramRevision) -> Option<Trigger> {
        if program.is_routine() {
            self.launcher.launch(program)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    /// Launcher recording every trigger it starts.
    #[derive(Default)]
    struct CountingLauncher {
        started: Mutex<Vec<(String, Trigger)>>,
    }

    impl CountingLauncher {
        fn starts(&self) -> usize {
            self.started.lock().unwrap().len()
        }

        fn stops(&self) -> usize {
            self.started
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, t)| t.is_stopped())
                .count()
        }
    }

    impl TriggerLauncher for CountingLauncher {
        fn launch(&self, program: &ProgramRevision) -> Option<Trigger> {
            let trigger = Trigger::new(CancellationToken::new());
            self.started
                .lock()
                .unwrap()
                .push((program.key(), trigger.clone()));
            Some(trigger)
        }
    }

    fn routine(domain: &str, id: &str, code: &str) -> ProgramRevision {
        ProgramRevision::routine(domain, id, 1, "@every 1m", Duration::from_secs(1), code)
    }

    fn setup() -> (ProgramCache, Arc<CountingLauncher>) {
        let launcher = Arc::new(CountingLauncher::default());
        (ProgramCache::new(launcher.clone()), launcher)
    }

    fn pass(cache: &ProgramCache, programs: &[ProgramRevision]) -> ReconcileSummary {
        cache.begin().unwrap();
        for program in programs {
            cache.observe(program.clone());
        }
        cache.commit().unwrap()
    }

    #[test]
    fn test_second_unchanged_pass_is_idempotent() {
        let (cache, launcher) = setup();
        let programs = vec![routine("acme", "a", "return 1"), routine("acme", "b", "return 2")];

        let first = pass(&cache, &programs);
        assert_eq!(first.added, 2);
        assert_eq!(launcher.starts(), 2);

        let second = pass(&cache, &programs);
        assert_eq!(
            second,
            ReconcileSummary {
                unchanged: 2,
                ..Default::default()
            }
        );
        assert_eq!(launcher.starts(), 2);
        assert_eq!(launcher.stops(), 0);
    }

    #[test]
    fn test_changed_program_is_replaced() {
        let (cache, launcher) = setup();
        pass(&cache, &[routine("acme", "a", "return 1")]);

        let mut edited = routine("acme", "a", "return 42");
        edited.revision = 2;
        let summary = pass(&cache, &[edited.clone()]);

        assert_eq!(summary.replaced, 1);
        assert_eq!(launcher.starts(), 2);
        assert_eq!(launcher.stops(), 1);
        assert_eq!(cache.get("acme/a"), Some(edited));
        assert!(cache.is_triggered("acme/a"));
    }

    #[test]
    fn test_vanished_program_is_removed() {
        let (cache, launcher) = setup();
        pass(
            &cache,
            &[routine("acme", "a", "return 1"), routine("acme", "b", "return 2")],
        );

        let summary = pass(&cache, &[routine("acme", "a", "return 1")]);

        assert_eq!(summary.removed, 1);
        assert_eq!(summary.unchanged, 1);
        assert_eq!(launcher.stops(), 1);
        assert!(cache.get("acme/b").is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_retain_domain_keeps_failed_tenant() {
        let (cache, launcher) = setup();
        pass(
            &cache,
            &[routine("acme", "a", "return 1"), routine("globex", "g", "return 1")],
        );

        cache.begin().unwrap();
        cache.observe(routine("acme", "a", "return 1"));
        assert_eq!(cache.retain_domain("globex"), 1);
        let summary = cache.commit().unwrap();

        assert_eq!(summary.removed, 0);
        assert_eq!(launcher.stops(), 0);
        assert!(cache.is_triggered("globex/g"));
    }

    #[test]
    fn test_begin_twice_fails() {
        let (cache, _) = setup();
        cache.begin().unwrap();
        assert_eq!(cache.begin(), Err(ReconcileError::PassInProgress));
        assert!(cache.in_pass());

        cache.commit().unwrap();
        assert_eq!(cache.commit(), Err(ReconcileError::NoPassOpen));
        assert!(!cache.in_pass());
    }

    #[test]
    fn test_ordinary_program_has_no_trigger() {
        let (cache, launcher) = setup();
        let mut program = routine("acme", "o", "return 1");
        program.kind = crate::program::ProgramKind::Ordinary;

        assert_eq!(cache.observe(program), Observation::Added);
        assert_eq!(launcher.starts(), 0);
        assert!(!cache.is_triggered("acme/o"));
    }

    #[test]
    fn test_stop_all() {
        let (cache, launcher) = setup();
        pass(
            &cache,
            &[routine("acme", "a", "return 1"), routine("acme", "b", "return 2")],
        );

        cache.stop_all();

        assert!(cache.is_empty());
        assert_eq!(launcher.stops(), 2);
    }
}
