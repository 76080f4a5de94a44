//! LLM gateway: builds the chat completion body, sends it, and classifies the
//! outcome into a [`GatewayError`].
//!
//! One call produces exactly one result or one error. There is no retry and
//! no state is kept between calls.

pub mod error;
pub mod extract;
pub mod payload;
pub mod transport;

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde_json::Value;

pub use error::{ErrorKind, GatewayError};
pub use extract::{extract_markdown, extract_rubric_json, has_choices, ExtractedAnswer};
pub use transport::{HttpTransport, Transport};

use crate::config::ApiKey;

/// Default completion budget.
pub const DEFAULT_MAX_TOKENS: u32 = 8192;

/// Default per-call timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Raw JSON returned by the remote API on success.
pub type CompletionResult = Value;

/// Input to a single gateway call.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub endpoint: String,
    pub credential: ApiKey,
    pub model: String,
    pub prompt_text: String,
    pub image_data_url: Option<String>,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl CompletionRequest {
    pub fn new(
        endpoint: impl Into<String>,
        credential: impl Into<ApiKey>,
        model: impl Into<String>,
        prompt_text: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            credential: credential.into(),
            model: model.into(),
            prompt_text: prompt_text.into(),
            image_data_url: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_image(mut self, image_data_url: impl Into<String>) -> Self {
        self.image_data_url = Some(image_data_url.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Gateway façade over a [`Transport`].
#[derive(Clone)]
pub struct Gateway {
    transport: Arc<dyn Transport>,
}

impl Gateway {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Gateway backed by the direct (proxy-free) reqwest transport.
    pub fn http() -> Result<Self, reqwest::Error> {
        Ok(Self::new(Arc::new(HttpTransport::new()?)))
    }

    /// Perform one chat completion call.
    ///
    /// Fails with `Unconfigured` before any I/O when the endpoint or the
    /// credential is empty. A panic inside the transport is reported as
    /// `Unexpected`.
    pub async fn complete_chat(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResult, GatewayError> {
        if request.endpoint.is_empty() || request.credential.expose_secret().is_empty() {
            tracing::error!("LLM endpoint or API key is not configured");
            return Err(GatewayError::unconfigured());
        }

        let body = payload::build(
            &request.prompt_text,
            request.image_data_url.as_deref(),
            &request.model,
            request.max_tokens,
        );

        let call = self.transport.send(
            &request.endpoint,
            &request.credential,
            &body,
            request.timeout,
        );

        match AssertUnwindSafe(call).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                let cause = panic_message(&*panic);
                tracing::error!(error = %cause, "LLM call panicked");
                Err(GatewayError::unexpected(cause))
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
