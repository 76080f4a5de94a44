//! Outbound HTTP call to the LLM endpoint and outcome classification.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde_json::Value;

use super::error::{truncate_details, GatewayError};
use super::payload::ChatCompletionRequest;
use crate::config::ApiKey;

/// Sends a chat completion body and classifies the outcome.
///
/// Implementations must map every failure into a [`GatewayError`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        endpoint: &str,
        credential: &ApiKey,
        body: &ChatCompletionRequest,
        timeout: Duration,
    ) -> Result<Value, GatewayError>;
}

/// reqwest-backed transport that never goes through a proxy.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Build a client that ignores `HTTP_PROXY`/`HTTPS_PROXY` and system proxies.
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder().no_proxy().build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        endpoint: &str,
        credential: &ApiKey,
        body: &ChatCompletionRequest,
        timeout: Duration,
    ) -> Result<Value, GatewayError> {
        let payload = serde_json::to_vec(body).map_err(|e| {
            tracing::error!(error = %e, "Failed to serialize chat completion body");
            GatewayError::unexpected(e)
        })?;

        tracing::info!(
            endpoint = %endpoint,
            model = %body.model,
            max_tokens = body.max_tokens,
            timeout_secs = timeout.as_secs_f64(),
            "Sending chat completion request"
        );

        let response = self
            .client
            .post(endpoint)
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", credential.expose_secret()),
            )
            .header(header::CONTENT_TYPE, "application/json; charset=utf-8")
            .timeout(timeout)
            .body(payload)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, endpoint = %endpoint, "Request to LLM API failed");
                GatewayError::transport(describe(&e))
            })?;

        let status = response.status();
        // Body read shares the request timeout; a stall here is still a transport failure.
        let bytes = response.bytes().await.map_err(|e| {
            tracing::error!(error = %e, status = %status, "Failed to read LLM API response body");
            GatewayError::transport(describe(&e))
        })?;

        classify(status, &bytes)
    }
}

/// Turn a received status and body into a result or a classified error.
pub(crate) fn classify(status: StatusCode, bytes: &[u8]) -> Result<Value, GatewayError> {
    if status != StatusCode::OK {
        let details = match serde_json::from_slice::<Value>(bytes) {
            Ok(json) => json.to_string(),
            Err(_) => truncate_details(&decode_text(bytes)),
        };
        tracing::error!(
            status = status.as_u16(),
            details = %truncate_details(&details),
            "LLM API returned error status"
        );
        return Err(GatewayError::remote_http(status.as_u16(), details));
    }

    match serde_json::from_slice::<Value>(bytes) {
        Ok(json) => {
            tracing::info!("Received and parsed JSON response from LLM API");
            Ok(json)
        }
        Err(e) => {
            let raw = decode_text(bytes);
            tracing::error!(
                error = %e,
                raw = %truncate_details(&raw),
                "Failed to decode JSON from LLM API"
            );
            Err(GatewayError::malformed(
                "Failed to parse JSON response from LLM service.",
                Some(&raw),
            ))
        }
    }
}

/// UTF-8 decode, falling back to lossy replacement.
fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Render a reqwest error with its source chain, e.g. "operation timed out".
fn describe(err: &reqwest::Error) -> String {
    let mut text = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    if err.is_timeout() && !text.contains("timed out") {
        text.push_str(" (timed out)");
    }
    text
}
