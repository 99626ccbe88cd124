//! Data Transfer Objects - request/response types for the API.

use serde::{Deserialize, Serialize};

/// OpenAI-style list wrapper: `{"object": "list", "data": [...]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse<T> {
    pub object: String,
    pub data: Vec<T>,
}

impl<T> ListResponse<T> {
    pub fn new(data: Vec<T>) -> Self {
        Self {
            object: "list".to_string(),
            data,
        }
    }
}

/// One chat message. `content` stays raw JSON because it may be a string or
/// an array of content parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: serde_json::Value,
}

/// The parts of a chat completion request the gateway itself looks at.
/// Everything else is carried through in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ChatCompletionRequest {
    /// Rough token estimate for the prompt: one token per four characters of text content.
    pub fn estimated_prompt_tokens(&self) -> u32 {
        let chars: usize = self
            .messages
            .iter()
            .map(|m| content_chars(&m.content))
            .sum();
        chars.div_ceil(4) as u32
    }
}

fn content_chars(content: &serde_json::Value) -> usize {
    match content {
        serde_json::Value::String(text) => text.chars().count(),
        serde_json::Value::Array(parts) => parts
            .iter()
            .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
            .map(|t| t.chars().count())
            .sum(),
        _ => 0,
    }
}
