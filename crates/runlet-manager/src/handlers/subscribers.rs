// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Worker subscription endpoints

pub mod create;
pub mod delete_by_id;
pub mod get_all;
pub mod get_by_id;
pub mod report_load;
pub mod subscriber_info;
