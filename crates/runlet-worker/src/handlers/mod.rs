// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP handlers of the worker.

pub mod error;
pub mod health;
pub mod tasks;
