//! GitHub API error types.
//!
//! This module defines error types that distinguish between transient and
//! permanent GitHub API failures. The distinction drives the retry loop:
//!
//! - **Transient** errors are retried after a fixed pause (502/503/504, the
//!   unannounced 403 GitHub uses when overloaded, network failures)
//! - **Unauthorized** errors need the user to fix their token
//! - **Permanent** errors are everything else (malformed query, not found)
//!
//! Rate limiting is not an error kind: the fetcher waits it out before the
//! response ever becomes an `ApiError`.

use std::fmt;
use thiserror::Error;

/// The kind of GitHub API error, categorized for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// Transient error - safe to retry after a pause.
    Transient,

    /// Bad, missing or under-scoped credential.
    Unauthorized,

    /// Permanent error - retrying would give the same answer.
    Permanent,
}

impl ApiErrorKind {
    /// Returns true if this error is retriable.
    pub fn is_retriable(&self) -> bool {
        matches!(self, ApiErrorKind::Transient)
    }
}

/// A GitHub API error with categorization for retry decisions.
#[derive(Debug, Error)]
pub struct ApiError {
    /// The kind of error (transient, unauthorized or permanent).
    pub kind: ApiErrorKind,

    /// The HTTP status code, if available.
    pub status_code: Option<u16>,

    /// A human-readable description of the error.
    pub message: String,

    /// The underlying octocrab error, if available.
    #[source]
    pub source: Option<octocrab::Error>,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "GitHub API error (HTTP {}): {}", code, self.message),
            None => write!(f, "GitHub API error: {}", self.message),
        }
    }
}

impl ApiError {
    fn new(kind: ApiErrorKind, status_code: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            kind,
            status_code,
            message: message.into(),
            source: None,
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Transient, None, message)
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Permanent, None, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Unauthorized, None, message)
    }

    /// Categorizes a non-success HTTP status.
    ///
    /// 401 is a credential problem. 403 and the 5xx gateway family are what
    /// GitHub returns when it is overloaded or applying an unreported limit;
    /// waiting them out works. Anything else is permanent.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let kind = match status {
            401 => ApiErrorKind::Unauthorized,
            403 | 500 | 502 | 503 | 504 => ApiErrorKind::Transient,
            _ => ApiErrorKind::Permanent,
        };
        Self::new(kind, Some(status), message)
    }

    /// Categorizes an octocrab transport error.
    ///
    /// By the time octocrab hands back an error from a raw request no HTTP
    /// status was received, so the message is all there is to go on.
    pub fn from_octocrab(err: octocrab::Error) -> Self {
        let message = err.to_string();
        let kind = if is_network_error(&message) {
            ApiErrorKind::Transient
        } else {
            ApiErrorKind::Permanent
        };
        Self {
            kind,
            status_code: None,
            message,
            source: Some(err),
        }
    }
}

/// Checks if an error message indicates a network-level error.
fn is_network_error(message: &str) -> bool {
    let message_lower = message.to_lowercase();
    message_lower.contains("timeout")
        || message_lower.contains("connection")
        || message_lower.contains("network")
        || message_lower.contains("dns")
        || message_lower.contains("timed out")
        || message_lower.contains("hyper")
}
