//! Error types for backend requests
//!
//! Every failed request ends up as an [`ApiError`]. The router only cares
//! about its [`ErrorClass`]; callers usually care about the status and the
//! server's payload, which is kept intact so validation errors can be
//! rendered next to the offending form fields.

use std::time::Duration;
use thiserror::Error;

/// Error returned by the request pipeline
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// No response was received (connection refused, DNS, reset, ...)
    #[error("Network error: {0}")]
    Network(String),

    /// The request exceeded the client-side timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The server answered with a status outside 200..=399
    #[error("HTTP {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Human-readable message extracted from the payload
        message: String,
        /// Response payload, as JSON when it parsed, else as a JSON string
        body: serde_json::Value,
    },

    /// The request could not be built
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A successful response could not be decoded
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// The HTTP client could not be constructed
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),
}

/// Failure taxonomy used for retry and escalation decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// No response or client-side timeout
    TransientNetwork,
    /// 5xx
    TransientServer,
    /// 401 or 403
    Authorization,
    /// 422
    Validation,
    /// Anything else
    TerminalUnknown,
}

impl ApiError {
    /// Build a status error from a raw response body
    pub fn from_response(status: u16, body: &[u8]) -> Self {
        let body = serde_json::from_slice::<serde_json::Value>(body).unwrap_or_else(|_| {
            serde_json::Value::String(String::from_utf8_lossy(body).into_owned())
        });

        let message = ["message", "error"]
            .iter()
            .find_map(|field| body.get(*field).and_then(|v| v.as_str()))
            .or_else(|| body.as_str().filter(|s| !s.is_empty()))
            .map(str::to_string)
            .unwrap_or_else(|| format!("request failed with status {}", status));

        ApiError::Status { status, message, body }
    }

    /// HTTP status, if the server answered
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Server payload, if the server answered
    pub fn body(&self) -> Option<&serde_json::Value> {
        match self {
            ApiError::Status { body, .. } => Some(body),
            _ => None,
        }
    }

    /// Field-level validation errors from a 422 payload
    pub fn field_errors(&self) -> Option<&serde_json::Value> {
        match self {
            ApiError::Status { status: 422, body, .. } => body.get("errors"),
            _ => None,
        }
    }

    /// Whether the client gave up waiting
    pub fn is_timeout(&self) -> bool {
        matches!(self, ApiError::Timeout(_))
    }

    /// Whether no response was received at all
    pub fn is_no_response(&self) -> bool {
        matches!(self, ApiError::Network(_) | ApiError::Timeout(_))
    }

    /// Classify for retry and escalation
    pub fn class(&self) -> ErrorClass {
        match self {
            ApiError::Network(_) | ApiError::Timeout(_) => ErrorClass::TransientNetwork,
            ApiError::Status { status, .. } => match status {
                401 | 403 => ErrorClass::Authorization,
                422 => ErrorClass::Validation,
                500..=599 => ErrorClass::TransientServer,
                _ => ErrorClass::TerminalUnknown,
            },
            ApiError::InvalidRequest(_) | ApiError::Decode(_) | ApiError::ClientBuild(_) => {
                ErrorClass::TerminalUnknown
            }
        }
    }
}
