//! Error types for google-mcp
//!
//! This module defines all error types used throughout the server,
//! using `thiserror` for ergonomic error handling. Library functions return
//! [`Result`] (an `anyhow` alias); the dispatcher recovers the structured
//! [`ErrorKind`] of a failure with [`kind_of`].

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification reported to the calling agent for every failed request.
///
/// The set is closed: every failure anywhere in the pipeline is mapped onto
/// exactly one kind before it leaves the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The requested tool is not registered.
    UnknownTool,
    /// Arguments do not match the tool's input schema.
    InvalidArguments,
    /// No credential is available and interactive authorization is not possible.
    AuthRequired,
    /// The provider rejected the refresh token.
    RefreshFailed,
    /// The credential does not carry a scope the tool requires.
    InsufficientScope,
    /// The operator did not complete authorization in time.
    AuthorizationTimeout,
    /// The callback `state` did not match the issued nonce.
    AuthorizationStateMismatch,
    /// The remote API call itself failed.
    UpstreamFailure,
    /// The handler exceeded its deadline.
    Timeout,
    /// The stored credential could not be parsed.
    DataCorruption,
    /// Anything outside the taxonomy (configuration, I/O, panics).
    Internal,
}

impl ErrorKind {
    /// JSON-RPC error code used on the wire for this kind.
    ///
    /// # Examples
    ///
    /// ```
    /// use google_mcp::error::ErrorKind;
    ///
    /// assert_eq!(ErrorKind::UnknownTool.code(), -32602);
    /// assert_eq!(ErrorKind::Internal.code(), -32603);
    /// ```
    pub fn code(self) -> i64 {
        match self {
            Self::UnknownTool | Self::InvalidArguments => -32602,
            Self::AuthRequired => -32001,
            Self::RefreshFailed => -32002,
            Self::InsufficientScope => -32003,
            Self::AuthorizationTimeout => -32004,
            Self::AuthorizationStateMismatch => -32005,
            Self::DataCorruption => -32006,
            Self::UpstreamFailure => -32010,
            Self::Timeout => -32011,
            Self::Internal => -32603,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Main error type for google-mcp operations
///
/// This enum encompasses the failure taxonomy surfaced to the calling agent
/// together with the ambient failures (configuration, I/O, serialization)
/// that can occur while loading credentials or serving requests.
#[derive(Error, Debug)]
pub enum GoogleMcpError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// No tool is registered under the requested name
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Tool arguments failed schema validation or deserialization
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// No usable credential and interactive authorization is unavailable
    #[error("Authorization required: {0}")]
    AuthRequired(String),

    /// The provider rejected the refresh token
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    /// The credential lacks scopes required by the tool
    #[error("Insufficient scope: missing {}", missing.join(", "))]
    InsufficientScope {
        /// Scopes required by the tool but absent from the credential
        missing: Vec<String>,
    },

    /// The interactive authorization session expired before completion
    #[error("Authorization timed out after {seconds}s")]
    AuthorizationTimeout {
        /// Configured session timeout
        seconds: u64,
    },

    /// The callback carried a `state` value different from the issued nonce
    #[error("Authorization rejected: state mismatch in OAuth callback")]
    AuthorizationStateMismatch,

    /// A second interactive session was requested while one is pending
    #[error("Authorization already in progress")]
    AuthorizationInProgress,

    /// The interactive authorization failed for any other reason
    #[error("Authorization failed: {0}")]
    Authorization(String),

    /// The remote API returned an error
    #[error("Upstream failure ({status}): {message}")]
    Upstream {
        /// HTTP status returned by the provider
        status: u16,
        /// Provider error message
        message: String,
    },

    /// The handler did not finish before its deadline
    #[error("Tool call timed out after {seconds}s")]
    Timeout {
        /// Configured per-call timeout
        seconds: u64,
    },

    /// The stored credential is unreadable
    #[error("Stored credential is corrupt: {0}")]
    DataCorruption(String),

    /// A credential renewal that other requests were queued on failed
    #[error("{message}")]
    Renewal {
        /// Kind of the original failure
        kind: ErrorKind,
        /// Rendered chain of the original failure
        message: String,
    },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl GoogleMcpError {
    /// Maps this error onto the wire taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownTool(_) => ErrorKind::UnknownTool,
            Self::InvalidArguments(_) => ErrorKind::InvalidArguments,
            Self::AuthRequired(_) | Self::AuthorizationInProgress | Self::Authorization(_) => {
                ErrorKind::AuthRequired
            }
            Self::RefreshFailed(_) => ErrorKind::RefreshFailed,
            Self::InsufficientScope { .. } => ErrorKind::InsufficientScope,
            Self::AuthorizationTimeout { .. } => ErrorKind::AuthorizationTimeout,
            Self::AuthorizationStateMismatch => ErrorKind::AuthorizationStateMismatch,
            Self::Upstream { .. } | Self::Http(_) => ErrorKind::UpstreamFailure,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::DataCorruption(_) => ErrorKind::DataCorruption,
            Self::Renewal { kind, .. } => *kind,
            Self::Config(_) | Self::Io(_) | Self::Serialization(_) | Self::Yaml(_) => {
                ErrorKind::Internal
            }
        }
    }
}

/// Result type alias for google-mcp operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;

/// Recovers the [`ErrorKind`] of an `anyhow` error.
///
/// Walks the error chain so that context added with `anyhow::Context` does
/// not hide the underlying [`GoogleMcpError`]. Errors that never originated
/// from this crate are reported as [`ErrorKind::Internal`].
pub fn kind_of(error: &anyhow::Error) -> ErrorKind {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<GoogleMcpError>())
        .map(GoogleMcpError::kind)
        .unwrap_or(ErrorKind::Internal)
}
