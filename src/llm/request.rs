use serde::{ Deserialize, Serialize };

use super::RequestOptions;
use crate::models::chat::{ Message, Response, Usage };

/// Body of `POST {base_url}/messages`.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct MessagesRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub stream: bool,
}

/// Maps a history and per-call options to the wire payload. Every message
/// passed in is sent; trimming, if any, happens before this point.
pub fn build_request(history: &[Message], model: &str, options: &RequestOptions) -> MessagesRequest {
    MessagesRequest {
        model: model.to_string(),
        messages: history.to_vec(),
        temperature: options.temperature,
        max_tokens: options.max_tokens,
        system: options.system.clone(),
        stream: options.stream,
    }
}

/// Buffered (non-streaming) response body.
#[derive(Deserialize, Debug, Clone)]
pub struct MessagesResponse {
    pub id: String,
    pub model: String,
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

impl MessagesResponse {
    /// Concatenated text of all text blocks, in order.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text.as_deref())
            .collect()
    }

    pub fn into_response(self) -> Response {
        Response {
            content: self.text(),
            id: self.id,
            model: self.model,
            usage: self.usage,
            stop_reason: self.stop_reason,
        }
    }
}
