//! Pull the assistant's text and an optional fenced JSON rubric out of a
//! completion result.
//!
//! Nothing here fails: an unexpected shape is reported as `None`.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

/// First ```` ```json ```` fenced block, lazily matched.
static JSON_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```json\s*(.*?)\s*```").expect("valid fence regex"));

#[derive(Deserialize)]
struct ChoiceEnvelope {
    choices: Vec<Value>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

/// Text and rubric derived from one completion result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedAnswer {
    pub markdown: Option<String>,
    pub rubric_json: Option<String>,
}

impl ExtractedAnswer {
    /// Extract markdown and, when present, the rubric block inside it.
    pub fn from_result(result: &Value) -> Self {
        let markdown = extract_markdown(result);
        let rubric_json = markdown.as_deref().and_then(extract_rubric_json);
        Self {
            markdown,
            rubric_json,
        }
    }
}

/// `choices[0].message.content` when it is a string.
pub fn extract_markdown(result: &Value) -> Option<String> {
    let envelope = ChoiceEnvelope::deserialize(result).ok()?;
    let first = envelope.choices.first()?;
    let choice = Choice::deserialize(first).ok()?;
    Some(choice.message.content)
}

/// Whether the result carries a non-empty `choices` array.
pub fn has_choices(result: &Value) -> bool {
    result
        .get("choices")
        .and_then(Value::as_array)
        .is_some_and(|choices| !choices.is_empty())
}

/// Contents of the first ```` ```json ```` block.
///
/// Valid JSON comes back pretty-printed with two-space indentation; anything
/// else comes back as the raw trimmed block text.
pub fn extract_rubric_json(markdown: &str) -> Option<String> {
    let captures = JSON_FENCE.captures(markdown)?;
    let inner = captures.get(1)?.as_str().trim();

    match serde_json::from_str::<Value>(inner) {
        Ok(parsed) => match serde_json::to_string_pretty(&parsed) {
            Ok(pretty) => {
                tracing::debug!("Extracted rubric JSON from model output");
                Some(pretty)
            }
            Err(_) => Some(inner.to_string()),
        },
        Err(e) => {
            tracing::warn!(error = %e, "Fenced rubric block is not valid JSON, returning raw text");
            Some(inner.to_string())
        }
    }
}
