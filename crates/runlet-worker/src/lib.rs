// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Runlet Worker - executes tenant programs on behalf of the manager
//!
//! The worker exposes one endpoint, `POST /v1/tasks`, and keeps two caches:
//!
//! | Cache | Key | Lifetime |
//! |-------|-----|----------|
//! | [`ExecutionCache`](execution_cache::ExecutionCache) | `domain/program_uuid` | `RUNLET_PROGRAM_TTL_SECS` |
//! | [`ModuleCache`](module_cache::ModuleCache) | `language:domain/name@revision` | `RUNLET_MODULE_TTL_SECS` |
//!
//! A task is compiled once per cache window and then run with its deadline.
//! Responses carry `X-Expires` so callers can route the next run of the same
//! program to this worker while the compiled artifact is still warm.
//!
//! On start the worker subscribes to the manager and reports its load (the
//! sum of the deadlines of cached programs) every few seconds.

pub mod config;
pub mod ctx;
pub mod execution_cache;
pub mod handlers;
pub mod module_cache;
pub mod runtime;
pub mod server;
pub mod subscription;
pub mod ttl_cache;
