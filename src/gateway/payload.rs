//! OpenAI-compatible chat completion request body.

use serde::{Deserialize, Serialize};

/// Outbound chat completion request.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

/// Message content: a bare string, or typed parts when an image is attached.
///
/// Variant order matters for `#[serde(untagged)]` decoding.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// One typed segment of multipart content.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

/// Build the request body for a single user turn.
///
/// Without an image the content is the prompt string itself; some strict
/// backends reject a one-element parts array. With an image the parts are
/// always text first, then the image.
pub fn build(
    prompt_text: &str,
    image_data_url: Option<&str>,
    model: &str,
    max_tokens: u32,
) -> ChatCompletionRequest {
    let content = match image_data_url {
        None => MessageContent::Text(prompt_text.to_string()),
        Some(url) => MessageContent::Parts(vec![
            ContentPart::Text {
                text: prompt_text.to_string(),
            },
            ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: url.to_string(),
                },
            },
        ]),
    };

    ChatCompletionRequest {
        model: model.to_string(),
        messages: vec![ChatMessage {
            role: "user".to_string(),
            content,
        }],
        max_tokens,
    }
}
