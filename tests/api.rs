//! Integration tests for the HTTP routes.
//!
//! Drives the axum router with `oneshot` while a wiremock server plays the
//! upstream LLM.

use std::sync::Arc;

use axum::body::Body;
use http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use aigrader::api::{create_router, AppState, ANALYSIS_PROMPT, REQUEST_ID_HEADER};
use aigrader::config::{ApiKey, Config, LlmConfig, ServerConfig};
use aigrader::gateway::Gateway;

const IMAGE: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

/// Build the app pointing at `api_url`, or unconfigured when `None`.
fn setup_app(api_url: Option<String>) -> axum::Router {
    let config = Config {
        server: ServerConfig::default(),
        llm: LlmConfig {
            api_key: api_url.as_ref().map(|_| ApiKey::from("sk-server")),
            api_url,
            model: "gpt-4.1".to_string(),
            max_tokens: 8192,
            timeout_secs: 5,
        },
    };

    let state = AppState {
        gateway: Gateway::http().expect("http client"),
        config: Arc::new(config),
    };
    create_router(state)
}

fn upstream(server: &MockServer) -> Option<String> {
    Some(format!("{}/v1/chat/completions", server.uri()))
}

fn completion(content: &str) -> Value {
    json!({
        "id": "chatcmpl-1",
        "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]
    })
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Parse the response body as JSON and return (status_code, json_value).
async fn parse_body(response: axum::response::Response) -> (StatusCode, Value) {
    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), 1_048_576)
        .await
        .expect("read body");
    let json: Value = serde_json::from_slice(&body_bytes).unwrap_or_default();
    (status, json)
}

// ============================================================================
// Plumbing routes
// ============================================================================

#[tokio::test]
async fn test_health_reports_configuration() {
    let app = setup_app(None);
    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert!(response.headers().get(REQUEST_ID_HEADER).is_some());
    let (status, json) = parse_body(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["llm_configured"], false);
}

#[tokio::test]
async fn test_cors_allows_configured_origin() {
    let app = setup_app(None);
    let request = Request::get("/api/greet")
        .header("origin", "http://localhost:5173")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(
        response.headers().get("access-control-allow-origin").unwrap(),
        "http://localhost:5173"
    );
    let (status, json) = parse_body(response).await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["message"].as_str().unwrap().starts_with("Hello"));
}

// ============================================================================
// POST /api/grade
// ============================================================================

#[tokio::test]
async fn test_grade_returns_feedback_markdown() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("Authorization", "Bearer sk-server"))
        .and(body_partial_json(json!({"model": "gpt-4.1", "max_tokens": 8192})))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("**Score:** 8/10")))
        .expect(1)
        .mount(&server)
        .await;

    let app = setup_app(upstream(&server));
    let response = app
        .oneshot(post_json(
            "/api/grade",
            json!({"imageData": IMAGE, "prompt": "Grade the student's work"}),
        ))
        .await
        .unwrap();
    let (status, json) = parse_body(response).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({"feedbackMarkdown": "**Score:** 8/10"}));
}

#[tokio::test]
async fn test_grade_missing_prompt_is_400() {
    let app = setup_app(None);
    let response = app
        .oneshot(post_json("/api/grade", json!({"imageData": IMAGE})))
        .await
        .unwrap();
    let (status, json) = parse_body(response).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Missing imageData or prompt in the request");
}

#[tokio::test]
async fn test_grade_non_json_body_is_400() {
    let app = setup_app(None);
    let request = Request::post("/api/grade")
        .header("content-type", "application/json")
        .body(Body::from("not json"))
        .unwrap();
    let (status, json) = parse_body(app.oneshot(request).await.unwrap()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "No data provided in the request body");
}

#[tokio::test]
async fn test_grade_rejects_non_data_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("x")))
        .expect(0)
        .mount(&server)
        .await;

    let app = setup_app(upstream(&server));
    let response = app
        .oneshot(post_json(
            "/api/grade",
            json!({"imageData": "https://example.com/a.png", "prompt": "p"}),
        ))
        .await
        .unwrap();
    let (status, json) = parse_body(response).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("data URL"));
}

#[tokio::test]
async fn test_grade_unconfigured_is_500() {
    let app = setup_app(None);
    let response = app
        .oneshot(post_json("/api/grade", json!({"imageData": IMAGE, "prompt": "p"})))
        .await
        .unwrap();
    let (status, json) = parse_body(response).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "API URL or Key is not configured.");
}

#[tokio::test]
async fn test_grade_upstream_error_keeps_structured_details() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(429)
                .set_body_json(json!({"error": {"message": "quota exceeded"}})),
        )
        .mount(&server)
        .await;

    let app = setup_app(upstream(&server));
    let response = app
        .oneshot(post_json("/api/grade", json!({"imageData": IMAGE, "prompt": "p"})))
        .await
        .unwrap();
    let (status, json) = parse_body(response).await;

    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json["error"], "External LLM API Error (429)");
    assert_eq!(json["details"], json!({"error": {"message": "quota exceeded"}}));
}

#[tokio::test]
async fn test_grade_without_markdown_is_500() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let app = setup_app(upstream(&server));
    let response = app
        .oneshot(post_json("/api/grade", json!({"imageData": IMAGE, "prompt": "p"})))
        .await
        .unwrap();
    let (status, json) = parse_body(response).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json["error"]
        .as_str()
        .unwrap()
        .starts_with("Failed to get valid Markdown feedback"));
}

#[tokio::test]
async fn test_grade_empty_markdown_is_500() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("")))
        .mount(&server)
        .await;

    let app = setup_app(upstream(&server));
    let response = app
        .oneshot(post_json("/api/grade", json!({"imageData": IMAGE, "prompt": "p"})))
        .await
        .unwrap();
    let (status, json) = parse_body(response).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        json["error"],
        "Failed to get valid Markdown feedback from AI service. Check backend logs."
    );
}

#[tokio::test]
async fn test_grade_long_upstream_error_details_stay_structured() {
    let server = MockServer::start().await;
    let upstream_error = json!({"error": {"message": "x".repeat(600)}});
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_json(upstream_error.clone()))
        .mount(&server)
        .await;

    let app = setup_app(upstream(&server));
    let response = app
        .oneshot(post_json("/api/grade", json!({"imageData": IMAGE, "prompt": "p"})))
        .await
        .unwrap();
    let (status, json) = parse_body(response).await;

    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(json["details"].is_object());
    assert_eq!(json["details"], upstream_error);
}

#[tokio::test]
async fn test_grade_whitespace_prompt_is_forwarded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("ok")))
        .expect(1)
        .mount(&server)
        .await;

    let app = setup_app(upstream(&server));
    let response = app
        .oneshot(post_json("/api/grade", json!({"imageData": IMAGE, "prompt": "   "})))
        .await
        .unwrap();
    let (status, json) = parse_body(response).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({"feedbackMarkdown": "ok"}));
}

#[tokio::test]
async fn test_grade_empty_object_is_no_data() {
    let app = setup_app(None);
    let response = app.oneshot(post_json("/api/grade", json!({}))).await.unwrap();
    let (status, json) = parse_body(response).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "No data provided in the request body");
}

// ============================================================================
// POST /api/analyze_answer
// ============================================================================

#[tokio::test]
async fn test_analyze_answer_extracts_rubric() {
    let server = MockServer::start().await;
    let content = "Key steps:\n1. Set up equation\n\n```json\n{\"steps\": [\"setup\", \"solve\"], \"answer\": 4}\n```";
    let upstream_body = completion(content);

    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "messages": [{"role": "user", "content": [{"type": "text", "text": ANALYSIS_PROMPT}]}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(upstream_body.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let app = setup_app(upstream(&server));
    let response = app
        .oneshot(post_json("/api/analyze_answer", json!({"imageData": IMAGE})))
        .await
        .unwrap();
    let (status, json) = parse_body(response).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["llmResponse"], upstream_body);
    assert_eq!(json["analyzedText"], content);
    assert_eq!(
        json["suggestedRubricJson"],
        "{\n  \"steps\": [\n    \"setup\",\n    \"solve\"\n  ],\n  \"answer\": 4\n}"
    );
}

#[tokio::test]
async fn test_analyze_answer_without_rubric_has_nulls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let app = setup_app(upstream(&server));
    let response = app
        .oneshot(post_json("/api/analyze_answer", json!({"imageData": IMAGE})))
        .await
        .unwrap();
    let (status, json) = parse_body(response).await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["analyzedText"].is_null());
    assert!(json["suggestedRubricJson"].is_null());
}

#[tokio::test]
async fn test_analyze_answer_missing_image_is_400() {
    let app = setup_app(None);
    let response = app
        .oneshot(post_json("/api/analyze_answer", json!({"imageData": ""})))
        .await
        .unwrap();
    let (status, json) = parse_body(response).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Missing imageData in the request");
}

// ============================================================================
// POST /api/test_connection
// ============================================================================

#[tokio::test]
async fn test_connection_uses_body_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/custom/chat"))
        .and(header("Authorization", "Bearer sk-from-body"))
        .and(body_partial_json(json!({
            "model": "custom-model",
            "max_tokens": 50,
            "messages": [{"role": "user", "content": "Hello, this is a connection test."}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("hello")))
        .expect(1)
        .mount(&server)
        .await;

    // Server-side config is deliberately unconfigured
    let app = setup_app(None);
    let response = app
        .oneshot(post_json(
            "/api/test_connection",
            json!({
                "apiUrl": format!("{}/custom/chat", server.uri()),
                "apiKey": "sk-from-body",
                "modelName": "custom-model"
            }),
        ))
        .await
        .unwrap();
    let (status, json) = parse_body(response).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json,
        json!({"success": true, "message": "API connection successful", "model": "custom-model"})
    );
}

#[tokio::test]
async fn test_connection_missing_parameters_is_400() {
    let app = setup_app(None);
    let response = app
        .oneshot(post_json(
            "/api/test_connection",
            json!({"apiUrl": "https://x.test", "apiKey": "k"}),
        ))
        .await
        .unwrap();
    let (status, json) = parse_body(response).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Missing required parameters");
}

#[tokio::test]
async fn test_connection_remote_error_omits_details() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "bad key"})))
        .mount(&server)
        .await;

    let app = setup_app(None);
    let response = app
        .oneshot(post_json(
            "/api/test_connection",
            json!({"apiUrl": server.uri(), "apiKey": "k", "modelName": "m"}),
        ))
        .await
        .unwrap();
    let (status, json) = parse_body(response).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json, json!({"error": "External LLM API Error (401)"}));
}

#[tokio::test]
async fn test_connection_empty_choices_is_format_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let app = setup_app(None);
    let response = app
        .oneshot(post_json(
            "/api/test_connection",
            json!({"apiUrl": server.uri(), "apiKey": "k", "modelName": "m"}),
        ))
        .await
        .unwrap();
    let (status, json) = parse_body(response).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "Invalid response format from API");
}
