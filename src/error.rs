use serde::Deserialize;
use thiserror::Error;

use crate::config::prompt::PromptError;

/// Status used when a transport failure carries no HTTP status of its own.
pub const DEFAULT_ERROR_STATUS: u16 = 500;

#[derive(Debug, Error)]
pub enum ClaudeError {
    #[error("API error ({status}): {message}")]
    Api {
        status: u16,
        message: String,
        error_type: Option<String>,
    },
    #[error("failed to decode response: {0}")]
    Decode(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("prompt error: {0}")]
    Prompt(#[from] PromptError),
}

impl ClaudeError {
    pub fn api(status: u16, message: impl Into<String>, error_type: Option<String>) -> Self {
        ClaudeError::Api {
            status,
            message: message.into(),
            error_type,
        }
    }

    /// HTTP status of a transport error, `None` for local failures.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClaudeError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn error_type(&self) -> Option<&str> {
        match self {
            ClaudeError::Api { error_type, .. } => error_type.as_deref(),
            _ => None,
        }
    }

    /// Builds a transport error from a non-2xx response body. The vendor body
    /// looks like `{"type":"error","error":{"type":"...","message":"..."}}`;
    /// anything else is reported verbatim.
    pub fn from_error_body(status: u16, body: &str) -> Self {
        match serde_json::from_str::<ErrorEnvelope>(body) {
            Ok(envelope) => ClaudeError::Api {
                status,
                message: envelope.error.message,
                error_type: envelope.error.kind,
            },
            Err(_) => {
                let message = if body.trim().is_empty() {
                    format!("request failed with status {}", status)
                } else {
                    body.trim().to_string()
                };
                ClaudeError::Api {
                    status,
                    message,
                    error_type: None,
                }
            }
        }
    }
}

impl From<reqwest::Error> for ClaudeError {
    fn from(err: reqwest::Error) -> Self {
        let status = err
            .status()
            .map(|s| s.as_u16())
            .unwrap_or(DEFAULT_ERROR_STATUS);
        ClaudeError::Api {
            status,
            message: err.to_string(),
            error_type: None,
        }
    }
}

#[derive(Deserialize, Debug)]
pub(crate) struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Deserialize, Debug)]
pub(crate) struct ErrorBody {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub message: String,
}

/// Status the vendor documents for each error type. Used for errors that
/// arrive inside an already-successful stream.
pub fn status_for_error_type(error_type: Option<&str>) -> u16 {
    match error_type {
        Some("invalid_request_error") => 400,
        Some("authentication_error") => 401,
        Some("permission_error") => 403,
        Some("not_found_error") => 404,
        Some("request_too_large") => 413,
        Some("rate_limit_error") => 429,
        Some("overloaded_error") => 529,
        _ => DEFAULT_ERROR_STATUS,
    }
}
