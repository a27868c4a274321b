// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for runlet-sandbox.

use std::time::Duration;

use thiserror::Error;

use crate::imports::ResolveError;

/// Errors raised while compiling or running a program.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SandboxError {
    /// The program is written in a language this engine cannot compile.
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    /// The program source is not valid UTF-8.
    #[error("program source is not valid UTF-8")]
    InvalidSource,

    /// An import could not be parsed (e.g. a bad revision suffix).
    #[error("malformed import '{import}': {reason}")]
    MalformedImport {
        /// The import as written in the source.
        import: String,
        /// Why it was rejected.
        reason: String,
    },

    /// An import is neither a built-in capability nor a resolvable module.
    #[error("import '{module}' is not allowed")]
    ImportNotAllowed {
        /// The rejected module name.
        module: String,
    },

    /// The module index failed while resolving an import.
    #[error("module resolution failed: {0}")]
    Resolve(#[from] ResolveError),

    /// The source (or one of its modules) failed to parse.
    #[error("compile error in {chunk}: {message}")]
    Compile {
        /// Chunk name (program key or module import).
        chunk: String,
        /// Parser message.
        message: String,
    },

    /// The script raised an error while running.
    #[error("runtime error: {message}")]
    Runtime {
        /// Script error message.
        message: String,
    },

    /// The script did not finish before its deadline.
    #[error("deadline of {}ms exceeded", .deadline.as_millis())]
    DeadlineExceeded {
        /// The deadline that was exceeded.
        deadline: Duration,
    },

    /// `run_with_http` was invoked on a program not submitted with HTTP.
    #[error("program cannot handle a CGI request")]
    CgiUnsupported,

    /// Host-side failure (e.g. the execution thread panicked).
    #[error("internal error: {0}")]
    Internal(String),
}

impl SandboxError {
    /// Stable error code for the `{code, message}` wire body.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::UnsupportedLanguage(_) => "UNSUPPORTED_LANGUAGE",
            Self::InvalidSource => "INVALID_SOURCE",
            Self::MalformedImport { .. } => "MALFORMED_IMPORT",
            Self::ImportNotAllowed { .. } => "IMPORT_NOT_ALLOWED",
            Self::Resolve(_) => "MODULE_RESOLUTION_FAILED",
            Self::Compile { .. } => "COMPILE_ERROR",
            Self::Runtime { .. } => "RUNTIME_ERROR",
            Self::DeadlineExceeded { .. } => "DEADLINE_EXCEEDED",
            Self::CgiUnsupported => "CGI_UNSUPPORTED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether this error was raised before the program started running.
    pub fn is_compile_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedLanguage(_)
                | Self::InvalidSource
                | Self::MalformedImport { .. }
                | Self::ImportNotAllowed { .. }
                | Self::Resolve(_)
                | Self::Compile { .. }
        )
    }

    /// Whether the caller sent something that can never compile.
    ///
    /// Upstream resolution failures are excluded: retrying may succeed.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidSource | Self::MalformedImport { .. } | Self::CgiUnsupported
        )
    }
}

/// Result type using SandboxError.
pub type Result<T> = std::result::Result<T, SandboxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            SandboxError::ImportNotAllowed {
                module: "os".into()
            }
            .error_code(),
            "IMPORT_NOT_ALLOWED"
        );
        assert_eq!(
            SandboxError::CgiUnsupported.to_string(),
            "program cannot handle a CGI request"
        );
        assert_eq!(
            SandboxError::DeadlineExceeded {
                deadline: Duration::from_millis(250)
            }
            .to_string(),
            "deadline of 250ms exceeded"
        );
    }

    #[test]
    fn test_error_classification() {
        assert!(SandboxError::InvalidSource.is_compile_error());
        assert!(!SandboxError::CgiUnsupported.is_compile_error());
        assert!(
            !SandboxError::Runtime {
                message: "boom".into()
            }
            .is_compile_error()
        );
        assert!(SandboxError::CgiUnsupported.is_client_error());
    }
}
