// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Runlet Manager - control plane for the runlet worker pool
//!
//! The manager keeps three pieces of state:
//!
//! - the [`Workforce`](workforce::Workforce): workers subscribe over HTTP,
//!   report their load every few seconds and are swept once they go quiet;
//! - the [`ProgramCache`](program_cache::ProgramCache): every routine program
//!   found in the tenant databases, each with a running trigger;
//! - the [`Dispatcher`](dispatcher::Dispatcher)'s affinity map, remembering
//!   which worker holds a warm compiled copy of each program.
//!
//! Background tasks:
//!
//! | Task | Default cadence | Purpose |
//! |------|-----------------|---------|
//! | [`Sweeper`](sweeper::Sweeper) | 5 s | evict dead workers |
//! | [`Reconciler`](reconciler::Reconciler) | 60 s | sync routines with tenant databases |
//! | one trigger per routine | its schedule | dispatch the routine to a worker |
//!
//! Dispatch is at-most-once: a firing with no available worker or a failed
//! POST is dropped and logged.

pub mod config;
pub mod ctx;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod program;
pub mod program_cache;
pub mod reconciler;
pub mod runtime;
pub mod schedule;
pub mod server;
pub mod store;
pub mod sweeper;
pub mod trigger;
pub mod workforce;
