// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! CGI bridge between an inbound HTTP request and a running script.
//!
//! The script sees the request through read-only accessors and builds the
//! response through write-only accessors (see the `cgi` capability). The host
//! takes the accumulated [`CgiResponse`] once the script returns.

use std::collections::BTreeMap;

use runlet_protocol::{HttpPayload, ProtocolError};

/// Status used when the script never calls `cgi.status`.
pub const DEFAULT_STATUS: u16 = 200;

/// Inbound request as seen by a script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CgiRequest {
    /// Request method.
    pub method: String,
    /// Request path including the query string.
    pub path: String,
    /// Headers keyed by lower-cased name.
    pub headers: BTreeMap<String, Vec<String>>,
    /// Raw body.
    pub body: Vec<u8>,
}

impl CgiRequest {
    /// Decode the HTTP payload attached to a task.
    pub fn from_payload(payload: &HttpPayload) -> Result<Self, ProtocolError> {
        let mut headers: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, values) in &payload.headers {
            headers
                .entry(name.to_ascii_lowercase())
                .or_default()
                .extend(values.iter().cloned());
        }

        Ok(Self {
            method: payload.method.clone(),
            path: payload.path.clone(),
            headers,
            body: payload.decode_body()?,
        })
    }

    /// First value of a header, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .and_then(|values| values.first())
            .map(String::as_str)
    }
}

/// Response accumulated by a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CgiResponse {
    /// Status code.
    pub status: u16,
    /// Headers in the order they were first set.
    pub headers: Vec<(String, String)>,
    /// Body chunks written so far.
    pub body: Vec<u8>,
}

impl Default for CgiResponse {
    fn default() -> Self {
        Self {
            status: DEFAULT_STATUS,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }
}

impl CgiResponse {
    /// Set a header, replacing any earlier value with the same name.
    pub fn set_header(&mut self, name: &str, value: &str) {
        match self
            .headers
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
        {
            Some(slot) => slot.1 = value.to_string(),
            None => self.headers.push((name.to_string(), value.to_string())),
        }
    }
}

/// Request/response pair shared with the `cgi` capability for one run.
#[derive(Debug, Default)]
pub(crate) struct CgiExchange {
    pub(crate) request: CgiRequest,
    pub(crate) response: CgiResponse,
}

impl CgiExchange {
    pub(crate) fn new(request: CgiRequest) -> Self {
        Self {
            request,
            response: CgiResponse::default(),
        }
    }
}
