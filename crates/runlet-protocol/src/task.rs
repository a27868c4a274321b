// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::collections::BTreeMap;
use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors decoding the payload of a task.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A base64 field could not be decoded.
    #[error("field '{field}' is not valid base64: {source}")]
    InvalidBase64 {
        /// Name of the offending field.
        field: &'static str,
        /// Decoder error.
        source: base64::DecodeError,
    },
}

/// Body of `POST /v1/tasks`: one execution request for a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Script language (`lua`).
    pub language: String,
    /// Execution deadline in milliseconds.
    pub deadline: u64,
    /// Tenant domain owning the program.
    pub domain: String,
    /// Program identity within the domain.
    pub program_uuid: String,
    /// Program source, base64 encoded.
    pub source_code: String,
    /// Inbound HTTP request; when present the program runs in CGI mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpPayload>,
}

impl Task {
    /// Build a task from raw source bytes.
    pub fn new(
        domain: impl Into<String>,
        program_uuid: impl Into<String>,
        language: impl Into<String>,
        deadline: Duration,
        source: &[u8],
    ) -> Self {
        Self {
            language: language.into(),
            deadline: deadline.as_millis() as u64,
            domain: domain.into(),
            program_uuid: program_uuid.into(),
            source_code: STANDARD.encode(source),
            http: None,
        }
    }

    /// Attach an inbound HTTP request, switching the task to CGI mode.
    pub fn with_http(mut self, http: HttpPayload) -> Self {
        self.http = Some(http);
        self
    }

    /// Deadline as a [`Duration`].
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline)
    }

    /// Cache identity of the program on a worker (`domain/program_uuid`).
    pub fn program_key(&self) -> String {
        format!("{}/{}", self.domain, self.program_uuid)
    }

    /// Decode the base64 program source.
    pub fn decode_source(&self) -> Result<Vec<u8>, ProtocolError> {
        STANDARD
            .decode(self.source_code.as_bytes())
            .map_err(|source| ProtocolError::InvalidBase64 {
                field: "source_code",
                source,
            })
    }
}

/// Inbound HTTP request forwarded to a CGI-mode program.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpPayload {
    /// Request method.
    #[serde(default = "default_method")]
    pub method: String,
    /// Request path (including query string).
    #[serde(default = "default_path")]
    pub path: String,
    /// Request headers; names are compared case-insensitively by the sandbox.
    #[serde(default)]
    pub headers: BTreeMap<String, Vec<String>>,
    /// Request body, base64 encoded.
    #[serde(default)]
    pub body: String,
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_path() -> String {
    "/".to_string()
}

impl HttpPayload {
    /// Build a payload from raw body bytes.
    pub fn new(method: impl Into<String>, path: impl Into<String>, body: &[u8]) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            headers: BTreeMap::new(),
            body: STANDARD.encode(body),
        }
    }

    /// Append a header value.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .entry(name.into())
            .or_default()
            .push(value.into());
        self
    }

    /// Decode the base64 request body.
    pub fn decode_body(&self) -> Result<Vec<u8>, ProtocolError> {
        STANDARD
            .decode(self.body.as_bytes())
            .map_err(|source| ProtocolError::InvalidBase64 {
                field: "http.body",
                source,
            })
    }
}
