//! Error types for aigrader.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::Value;

use crate::gateway::GatewayError;

/// Result type alias for aigrader operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for aigrader.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("{0}")]
    Internal(String),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::Gateway(e) => StatusCode::from_u16(e.status_code)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut body = serde_json::json!({ "error": self.to_string() });

        if let Error::Gateway(GatewayError {
            details: Some(details),
            ..
        }) = &self
        {
            body["details"] = structured_details(details);
        }

        (status, axum::Json(body)).into_response()
    }
}

/// Details that parse as JSON are sent as JSON, not as a quoted string.
fn structured_details(details: &str) -> Value {
    serde_json::from_str(details).unwrap_or_else(|_| Value::String(details.to_string()))
}
