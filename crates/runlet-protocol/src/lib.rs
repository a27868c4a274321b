// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Runlet Protocol - HTTP wire types
//!
//! This crate holds the JSON bodies exchanged between the manager, its
//! workers and callers submitting tasks directly:
//!
//! | Endpoint | Side | Body |
//! |----------|------|------|
//! | `POST /v1/subscribers` | manager | [`Subscription`] |
//! | `PUT /v1/subscribers/{id}/load` | manager | [`LoadReport`] |
//! | `POST /v1/tasks` | worker | [`Task`] (optionally with [`HttpPayload`]) |
//! | any error response | both | [`ErrorBody`] |
//!
//! Workers advertise how long a compiled program stays cached through the
//! [`EXPIRES_HEADER`] response header (see [`expires`]).

#![deny(missing_docs)]

/// Structured error bodies.
pub mod error;

/// `X-Expires` header formatting and parsing.
pub mod expires;

/// Worker subscription and load report bodies.
pub mod subscriber;

/// Task submission bodies.
pub mod task;

pub use error::ErrorBody;
pub use expires::{EXPIRES_HEADER, format_expires, parse_expires};
pub use subscriber::{LoadReport, Subscription};
pub use task::{HttpPayload, ProtocolError, Task};

/// Path prefix shared by every versioned endpoint.
pub const API_PREFIX: &str = "/v1";
