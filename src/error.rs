//! Error types for the stub engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while declaring rules or verifications.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A registration URL could not be parsed.
    #[error("invalid url {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// A regex or glob pattern failed to compile.
    #[error("invalid pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// A status code outside 100..=599.
    #[error("invalid status code: {0}")]
    InvalidStatus(u16),
}

/// Kind of a simulated transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    ConnectionRefused,
    ConnectionReset,
    Timeout,
    Other,
}

/// Simulated I/O failure raised by an exception action.
///
/// Surfaced to the caller of [`MockEngine::execute`](crate::MockEngine::execute)
/// in place of a response.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind:?}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn connection_refused(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::ConnectionRefused, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Other, message)
    }
}

/// Raised by the verification façade when the number of logged requests
/// matching a verification does not satisfy the expectation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Expected {expected} calls, but found {actual}.")]
pub struct VerificationError {
    pub expected: String,
    pub actual: usize,
}
