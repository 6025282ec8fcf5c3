//! Shared error taxonomy used across all reportdeck crates.
//!
//! Mirrors the error categories in §7 of the design: `BadRequest` and
//! friends are not separate Rust types, they are `ErrorKind` tags carried
//! by a single `Error` so the dispatcher (C1) can translate any of them
//! into a JSON-RPC error envelope uniformly.

use serde::{Deserialize, Serialize};

/// The taxonomy from §7. Every fallible operation in the core classifies
/// its failure into one of these before it crosses a tool boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Schema violation, mutually exclusive fields, unknown method. Never retried.
    BadRequest,
    /// Classified-retryable upstream failure (429/5xx-equivalent).
    BackendTransient,
    /// Non-retryable upstream failure.
    BackendPermanent,
    /// Upstream returned data that fails schema validation after retries.
    InvalidOutput,
    /// A referenced id (dataset, sheet) does not exist.
    ResourceMissing,
    /// The request-level deadline elapsed.
    Deadline,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "BadRequest",
            ErrorKind::BackendTransient => "BackendTransient",
            ErrorKind::BackendPermanent => "BackendPermanent",
            ErrorKind::InvalidOutput => "InvalidOutput",
            ErrorKind::ResourceMissing => "ResourceMissing",
            ErrorKind::Deadline => "Deadline",
        }
    }
}

/// Shared error type used across all reportdeck crates.
#[derive(thiserror::Error, Debug)]
#[error("{kind}: {message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, message)
    }

    pub fn backend_transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BackendTransient, message)
    }

    pub fn backend_permanent(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BackendPermanent, message)
    }

    pub fn invalid_output(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidOutput, message)
    }

    pub fn resource_missing(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ResourceMissing, message)
    }

    pub fn deadline(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Deadline, message)
    }

    /// `true` for the conditions §4.5 defines as retryable for HTTP-like errors.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, ErrorKind::BackendTransient)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::new(ErrorKind::BackendPermanent, format!("IO: {e}"))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::new(ErrorKind::InvalidOutput, format!("JSON: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_is_retryable() {
        assert!(Error::backend_transient("x").is_retryable());
        assert!(!Error::backend_permanent("x").is_retryable());
        assert!(!Error::bad_request("x").is_retryable());
        assert!(!Error::invalid_output("x").is_retryable());
    }

    #[test]
    fn display_matches_dispatcher_envelope_format() {
        let e = Error::bad_request("missing field");
        assert_eq!(e.to_string(), "BadRequest: missing field");
    }
}
