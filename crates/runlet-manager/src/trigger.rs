// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Routine triggers.
//!
//! A [`Trigger`] is the handle of one running per-routine timer task. The
//! [`ProgramCache`](crate::program_cache::ProgramCache) starts triggers
//! through a [`TriggerLauncher`] and stops them when a routine changes or
//! disappears.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dispatcher::Dispatcher;
use crate::program::ProgramRevision;
use crate::schedule::Schedule;

/// Handle of a running trigger. Stopping is idempotent.
#[derive(Debug, Clone)]
pub struct Trigger {
    token: CancellationToken,
}

impl Trigger {
    /// Wrap the cancellation token observed by the trigger task.
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Ask the trigger task to stop after its current iteration.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Whether [`stop`](Self::stop) was called.
    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Starts triggers for routine programs.
pub trait TriggerLauncher: Send + Sync {
    /// Start firing `program` on its schedule.
    ///
    /// Returns `None` when the program cannot be scheduled; it is then cached
    /// without a trigger.
    fn launch(&self, program: &ProgramRevision) -> Option<Trigger>;
}

/// Launcher dispatching each firing through a [`Dispatcher`].
pub struct ScheduledLauncher {
    dispatcher: Arc<Dispatcher>,
}

impl ScheduledLauncher {
    /// Create a launcher firing through `dispatcher`.
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

impl TriggerLauncher for ScheduledLauncher {
    fn launch(&self, program: &ProgramRevision) -> Option<Trigger> {
        let key = program.key();
        let schedule = match Schedule::parse(&program.schedule) {
            Ok(schedule) => schedule,
            Err(e) => {
                warn!(program = %key, error = %e, "Routine has an invalid schedule");
                return None;
            }
        };

        let token = CancellationToken::new();
        let task = program.to_task();
        let dispatcher = self.dispatcher.clone();
        let cancel = token.clone();

        info!(program = %key, revision = program.revision, schedule = ?schedule, "Trigger started");
        tokio::spawn(async move {
            loop {
                let Some(delay) = schedule.delay_from(Utc::now()) else {
                    info!(program = %key, "Schedule has no further occurrence");
                    break;
                };

                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => break,

                    _ = tokio::time::sleep(delay) => {
                        debug!(program = %key, "Routine firing");
                        let dispatcher = dispatcher.clone();
                        let task = task.clone();
                        let trigger = cancel.clone();
                        tokio::spawn(async move { dispatcher.fire(&task, &trigger).await });
                    }
                }
            }
            dispatcher.forget(&key);
            debug!(program = %key, "Trigger stopped");
        });

        Some(Trigger::new(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workforce::Workforce;
    use std::time::Duration;

    fn launcher() -> (ScheduledLauncher, Arc<Dispatcher>) {
        let workforce = Arc::new(Workforce::new(Duration::from_secs(15)));
        let dispatcher = Arc::new(Dispatcher::new(workforce));
        (ScheduledLauncher::new(dispatcher.clone()), dispatcher)
    }

    #[tokio::test(start_paused = true)]
    async fn test_firings_without_workers_are_dropped() {
        let (launcher, dispatcher) = launcher();
        let program = ProgramRevision::routine(
            "acme",
            "tick",
            1,
            "@every 10s",
            Duration::from_secs(1),
            "return 1",
        );

        let trigger = launcher.launch(&program).unwrap();
        tokio::time::sleep(Duration::from_secs(35)).await;
        trigger.stop();
        tokio::time::sleep(Duration::from_secs(30)).await;

        let stats = dispatcher.stats();
        assert_eq!(stats.dropped, 3);
        assert_eq!(stats.dispatched, 0);
        assert!(trigger.is_stopped());
    }

    #[tokio::test]
    async fn test_invalid_schedule_has_no_trigger() {
        let (launcher, _) = launcher();
        let program = ProgramRevision::routine(
            "acme",
            "bad",
            1,
            "whenever",
            Duration::from_secs(1),
            "return 1",
        );

        assert!(launcher.launch(&program).is_none());
    }
}
