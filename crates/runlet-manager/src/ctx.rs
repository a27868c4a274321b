// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Service context

use std::sync::Arc;

use crate::dispatcher::Dispatcher;
use crate::program_cache::ProgramCache;
use crate::workforce::Workforce;

/// State shared by the manager's handlers.
#[derive(Clone)]
pub struct Ctx {
    /// Subscribed workers.
    pub workforce: Arc<Workforce>,
    /// Scheduled routines.
    pub programs: Arc<ProgramCache>,
    /// Task dispatcher.
    pub dispatcher: Arc<Dispatcher>,
}
