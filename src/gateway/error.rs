//! Unified error taxonomy for gateway calls.

use std::fmt;

/// Maximum number of characters of a non-JSON remote body kept in `details`.
pub const DETAILS_LIMIT: usize = 500;

/// Classification of a failed gateway call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Endpoint or credential missing; no network I/O was attempted.
    Unconfigured,
    /// Remote answered with a non-200 status.
    RemoteHttpError,
    /// Remote answered 200 but the body was not usable JSON.
    MalformedResponse,
    /// DNS, connect, TLS or timeout failure.
    TransportFailure,
    /// Anything that escaped the other categories.
    Unexpected,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Unconfigured => "unconfigured",
            ErrorKind::RemoteHttpError => "remote_http_error",
            ErrorKind::MalformedResponse => "malformed_response",
            ErrorKind::TransportFailure => "transport_failure",
            ErrorKind::Unexpected => "unexpected",
        };
        f.write_str(name)
    }
}

/// Error returned by the gateway façade.
///
/// `status_code` mirrors the remote status for `RemoteHttpError`; the other
/// kinds use a fixed mapping (503 for transport failures, 500 otherwise).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct GatewayError {
    pub kind: ErrorKind,
    pub message: String,
    pub status_code: u16,
    pub details: Option<String>,
}

impl GatewayError {
    pub fn unconfigured() -> Self {
        Self {
            kind: ErrorKind::Unconfigured,
            message: "API URL or Key is not configured.".to_string(),
            status_code: 500,
            details: None,
        }
    }

    /// `details` is stored as given; callers cap raw text before passing it in
    /// so that a re-serialized JSON body stays parseable.
    pub fn remote_http(status_code: u16, details: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::RemoteHttpError,
            message: format!("External LLM API Error ({})", status_code),
            status_code,
            details: Some(details.into()),
        }
    }

    pub fn malformed(message: impl Into<String>, details: Option<&str>) -> Self {
        Self {
            kind: ErrorKind::MalformedResponse,
            message: message.into(),
            status_code: 500,
            details: details.map(truncate_details),
        }
    }

    pub fn transport(cause: impl fmt::Display) -> Self {
        Self {
            kind: ErrorKind::TransportFailure,
            message: format!("Failed to connect to LLM service: {}", cause),
            status_code: 503,
            details: None,
        }
    }

    pub fn unexpected(cause: impl fmt::Display) -> Self {
        Self {
            kind: ErrorKind::Unexpected,
            message: format!("An unexpected error occurred in LLM service: {}", cause),
            status_code: 500,
            details: None,
        }
    }

    /// Drop the details payload, keeping kind, message and status.
    pub fn without_details(mut self) -> Self {
        self.details = None;
        self
    }
}

/// Keep at most [`DETAILS_LIMIT`] characters, cutting on a char boundary.
pub fn truncate_details(text: &str) -> String {
    match text.char_indices().nth(DETAILS_LIMIT) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
