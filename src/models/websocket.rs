use serde::{ Serialize, Deserialize };

use super::chat::{ Message, Usage };
use crate::editor::EditMode;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Runs one editing operation on `text`. `argument` is the language,
    /// style or instruction for the modes that need one.
    #[serde(rename = "edit")] Edit {
        mode: EditMode,
        text: String,
        #[serde(default)]
        argument: Option<String>,
        #[serde(default)]
        stream: bool,
    },
    #[serde(rename = "prompt")] Prompt {
        content: String,
        #[serde(default)]
        stream: bool,
    },
    #[serde(rename = "clear_history")]
    ClearHistory,
    #[serde(rename = "get_history")]
    GetHistory,
    #[serde(rename = "set_history")] SetHistory {
        messages: Vec<Message>,
    },
    #[serde(rename = "set_model")] SetModel {
        model: String,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "processing")]
    Processing,
    #[serde(rename = "partial")] Partial {
        content: String,
    },
    #[serde(rename = "response")] Response {
        content: String,
        id: String,
        model: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
        timestamp: i64,
    },
    #[serde(rename = "history")] History {
        messages: Vec<Message>,
    },
    #[serde(rename = "ok")]
    Ok,
    #[serde(rename = "error")] Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<u16>,
    },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error { message: message.into(), status: None }
    }
}
