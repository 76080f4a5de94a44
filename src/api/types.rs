//! Request and response bodies for the grader API.
//!
//! Field names follow the web client's camelCase convention.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `POST /api/grade`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeRequest {
    #[serde(default)]
    pub image_data: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
}

/// Body of `POST /api/analyze_answer`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub image_data: Option<String>,
}

/// Body of `POST /api/test_connection`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionTestRequest {
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeResponse {
    pub feedback_markdown: String,
}

/// Analysis result; absent text or rubric serialize as `null`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
    pub llm_response: Value,
    pub analyzed_text: Option<String>,
    pub suggested_rubric_json: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionTestResponse {
    pub success: bool,
    pub message: String,
    pub model: String,
}

/// Treat missing and empty strings alike.
pub fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
