//! HTTP request handlers.

use axum::{
    extract::{rejection::JsonRejection, Extension, State},
    response::IntoResponse,
    Json,
};
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::data_url::DataUrl;
use super::server::{AppState, RequestId};
use super::types::{
    non_empty, AnalysisResponse, AnalyzeRequest, ConnectionTestRequest, ConnectionTestResponse,
    GradeRequest, GradeResponse,
};
use crate::config::{ApiKey, LlmConfig};
use crate::error::Error;
use crate::gateway::{has_choices, CompletionRequest, ExtractedAnswer, GatewayError};

/// Prompt used to turn a standard answer image into rubric material.
pub const ANALYSIS_PROMPT: &str = "You are an AI assistant. Your task is to analyze the provided image, which represents a standard answer to a question. Extract all key components, concepts, steps, or pieces of information present in the answer. Present this information in a structured format (e.g., bullet points, numbered list, or a simple JSON structure) that would be easy for a teacher to use to create a detailed grading rubric. For example, if it's a math problem, identify the steps and the final answer. If it's a diagram, identify the key labels and relationships. If you provide a JSON structure for the rubric, ensure it is a valid JSON and enclosed in a markdown JSON code block like ```json ... ```.";

/// Prompt sent by the connection test.
pub const CONNECTION_TEST_PROMPT: &str = "Hello, this is a connection test.";

/// Token budget for the connection test.
pub const CONNECTION_TEST_MAX_TOKENS: u32 = 50;

/// Build a gateway request from the server-side LLM settings.
///
/// Missing URL or key become empty strings so the gateway reports `Unconfigured`.
fn configured_request(llm: &LlmConfig, prompt: &str, image_data_url: &str) -> CompletionRequest {
    CompletionRequest::new(
        llm.api_url.clone().unwrap_or_default(),
        llm.api_key.clone().unwrap_or_else(|| ApiKey::from("")),
        llm.model.clone(),
        prompt,
    )
    .with_image(image_data_url)
    .with_max_tokens(llm.max_tokens)
    .with_timeout(llm.timeout())
}

/// Decode a JSON body into `T`, mapping a rejection, an empty document
/// (`{}`, `[]`, `null`, `""`) or a shape mismatch to a 400.
fn require_body<T: DeserializeOwned>(
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<T, Error> {
    let no_data = || Error::BadRequest("No data provided in the request body".to_string());

    let Json(value) = payload.map_err(|rejection| {
        tracing::warn!(error = %rejection, "Rejected request body");
        no_data()
    })?;
    if is_empty_document(&value) {
        return Err(no_data());
    }
    serde_json::from_value(value).map_err(|e| {
        tracing::warn!(error = %e, "Request body has an unexpected shape");
        no_data()
    })
}

fn is_empty_document(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(text) => text.is_empty(),
        _ => false,
    }
}

/// Validate the image data URL supplied by the client.
fn require_image(image_data: &str) -> Result<(), Error> {
    DataUrl::parse_image(image_data)
        .map(|_| ())
        .map_err(|e| Error::BadRequest(e.to_string()))
}

/// Handle GET /
pub async fn index() -> &'static str {
    "Hello, World! This is the AI Grader backend with CORS enabled."
}

/// Handle GET /health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "aigrader",
        "llm_configured": state.config.llm.is_configured(),
    }))
}

/// Handle GET /api/greet
pub async fn greet() -> impl IntoResponse {
    Json(serde_json::json!({
        "message": "Hello, AI Grader User! This message is from your aigrader backend."
    }))
}

/// Handle POST /api/grade
pub async fn grade(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<GradeResponse>, Error> {
    let body: GradeRequest = require_body(payload)?;
    let (Some(image_data), Some(prompt)) = (non_empty(&body.image_data), non_empty(&body.prompt))
    else {
        return Err(Error::BadRequest(
            "Missing imageData or prompt in the request".to_string(),
        ));
    };
    require_image(image_data)?;

    tracing::info!(
        request_id = %request_id.0,
        prompt_chars = prompt.chars().count(),
        image_bytes = image_data.len(),
        "Received grading request"
    );

    let request = configured_request(&state.config.llm, prompt, image_data);
    let result = state.gateway.complete_chat(&request).await.map_err(|e| {
        log_gateway_error(&request_id, "grade", &e);
        e
    })?;

    // An empty answer is as useless to the client as a missing one
    match ExtractedAnswer::from_result(&result)
        .markdown
        .filter(|m| !m.is_empty())
    {
        Some(markdown) => {
            tracing::debug!(request_id = %request_id.0, markdown = %markdown, "Grading feedback");
            Ok(Json(GradeResponse {
                feedback_markdown: markdown,
            }))
        }
        None => {
            tracing::error!(
                request_id = %request_id.0,
                response = %result,
                "Could not extract Markdown content from LLM response"
            );
            Err(GatewayError::malformed(
                "Failed to get valid Markdown feedback from AI service. Check backend logs.",
                None,
            )
            .into())
        }
    }
}

/// Handle POST /api/analyze_answer
pub async fn analyze_answer(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<AnalysisResponse>, Error> {
    let body: AnalyzeRequest = require_body(payload)?;
    let Some(image_data) = non_empty(&body.image_data) else {
        return Err(Error::BadRequest(
            "Missing imageData in the request".to_string(),
        ));
    };
    require_image(image_data)?;

    tracing::info!(request_id = %request_id.0, "Received image for standard answer analysis");

    let request = configured_request(&state.config.llm, ANALYSIS_PROMPT, image_data);
    let result = state.gateway.complete_chat(&request).await.map_err(|e| {
        log_gateway_error(&request_id, "analyze_answer", &e);
        e
    })?;

    let answer = ExtractedAnswer::from_result(&result);
    tracing::info!(
        request_id = %request_id.0,
        has_text = answer.markdown.is_some(),
        has_rubric = answer.rubric_json.is_some(),
        "Standard answer analysis complete"
    );

    Ok(Json(AnalysisResponse {
        llm_response: result,
        analyzed_text: answer.markdown,
        suggested_rubric_json: answer.rubric_json,
    }))
}

/// Handle POST /api/test_connection
///
/// Uses the credentials in the body, never the server configuration.
pub async fn test_connection(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<ConnectionTestResponse>, Error> {
    let body: ConnectionTestRequest = require_body(payload)?;
    let (Some(api_url), Some(api_key), Some(model_name)) = (
        non_empty(&body.api_url),
        non_empty(&body.api_key),
        non_empty(&body.model_name),
    ) else {
        return Err(Error::BadRequest("Missing required parameters".to_string()));
    };

    tracing::info!(
        request_id = %request_id.0,
        api_url = %api_url,
        model = %model_name,
        "Testing LLM API connection"
    );

    let request = CompletionRequest::new(api_url, api_key, model_name, CONNECTION_TEST_PROMPT)
        .with_max_tokens(CONNECTION_TEST_MAX_TOKENS)
        .with_timeout(state.config.llm.timeout());

    let result = state.gateway.complete_chat(&request).await.map_err(|e| {
        log_gateway_error(&request_id, "test_connection", &e);
        e.without_details()
    })?;

    if has_choices(&result) {
        Ok(Json(ConnectionTestResponse {
            success: true,
            message: "API connection successful".to_string(),
            model: model_name.to_string(),
        }))
    } else {
        tracing::warn!(request_id = %request_id.0, "Connection test got a response without choices");
        Err(Error::Internal("Invalid response format from API".to_string()))
    }
}

fn log_gateway_error(request_id: &RequestId, route: &str, error: &GatewayError) {
    tracing::error!(
        request_id = %request_id.0,
        route = route,
        kind = %error.kind,
        status = error.status_code,
        details = ?error.details,
        "{}",
        error.message
    );
}
