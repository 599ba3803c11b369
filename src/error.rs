//! Error types for the transaction store

use std::time::Duration;

use hyper::StatusCode;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Why admission was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverloadReason {
    /// In-flight count already at capacity (fast-fail tier)
    CapacityExceeded,
    /// No slot became free within the admission timeout
    Timeout,
}

impl OverloadReason {
    /// Label used for metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            OverloadReason::CapacityExceeded => "capacity",
            OverloadReason::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for OverloadReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverloadReason::CapacityExceeded => write!(f, "capacity exceeded"),
            OverloadReason::Timeout => write!(f, "admission timed out"),
        }
    }
}

/// Errors that can occur in the transaction store
#[derive(Error, Debug)]
pub enum Error {
    /// Record failed validation; store state untouched
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Admission refused; caller should retry later
    #[error("Service is overloaded ({reason}), please try again later")]
    Overloaded {
        reason: OverloadReason,
        waited: Duration,
    },

    /// Malformed request at the transport level (bad JSON, bad query)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Short machine-readable kind, used in JSON error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation",
            Error::Overloaded { .. } => "overloaded",
            Error::InvalidRequest(_) => "invalid_request",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
            Error::Internal(_) => "internal",
        }
    }

    /// HTTP status the transport layer reports for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation(_) | Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Error::Overloaded { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Error::Config(_) | Error::Io(_) | Error::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// True if the caller may retry the same request later
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Overloaded { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::InvalidRequest(format!("malformed JSON body: {}", e))
    }
}

// =============================================================================
// Tests
// =============================================================================
