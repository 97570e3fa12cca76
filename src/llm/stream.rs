//! Incremental decoder for the server-sent-event body of a streaming
//! messages request.
//!
//! The transport hands over raw byte chunks whose boundaries have nothing to
//! do with line or event boundaries, so bytes are buffered until a full line
//! is available. Only `data: ` lines carry events; everything else (blank
//! separators, `event:` names, comments) is skipped.

use log::{ debug, warn };
use serde::Deserialize;

use crate::error::{ status_for_error_type, ClaudeError };
use crate::models::chat::{ Response, Usage };

const DATA_PREFIX: &str = "data:";
const DONE_MARKER: &str = "[DONE]";
const TEXT_DELTA_EVENT: &str = "content_block_delta";
const ERROR_EVENT: &str = "error";

/// Longest line accepted while waiting for its newline.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

#[derive(Deserialize, Debug)]
struct StreamEvent {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    delta: Option<EventDelta>,
    #[serde(default)]
    message_id: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    message: Option<EventMessage>,
    #[serde(default)]
    usage: Option<PartialUsage>,
    #[serde(default)]
    error: Option<EventError>,
}

#[derive(Deserialize, Debug)]
struct EventDelta {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct EventMessage {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<PartialUsage>,
}

#[derive(Deserialize, Debug)]
struct PartialUsage {
    #[serde(default)]
    input_tokens: Option<u32>,
    #[serde(default)]
    output_tokens: Option<u32>,
}

#[derive(Deserialize, Debug)]
struct EventError {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Turns raw body chunks into text deltas and, once the body ends, into the
/// full `Response`.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    pending: Vec<u8>,
    /// Prefix of `pending` already known to hold no newline.
    scanned: usize,
    content: String,
    id: Option<String>,
    model: Option<String>,
    usage: Option<Usage>,
    stop_reason: Option<String>,
    skipped: usize,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk and returns the text deltas it completed, in server
    /// order. A trailing partial line stays buffered for the next chunk, up
    /// to `MAX_LINE_BYTES`.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>, ClaudeError> {
        self.pending.extend_from_slice(chunk);
        let mut deltas = Vec::new();
        let mut consumed = 0;
        let mut search_from = self.scanned;

        while let Some(offset) = self.pending[search_from..].iter().position(|b| *b == b'\n') {
            let newline_pos = search_from + offset;
            let line = self.pending[consumed..newline_pos].to_vec();
            consumed = newline_pos + 1;
            search_from = consumed;
            if let Some(delta) = self.decode_line(&line)? {
                deltas.push(delta);
            }
        }

        self.pending.drain(..consumed);
        self.scanned = self.pending.len();
        if self.pending.len() > MAX_LINE_BYTES {
            return Err(
                ClaudeError::Decode(
                    format!("stream line exceeds {} bytes without a newline", MAX_LINE_BYTES)
                )
            );
        }

        Ok(deltas)
    }

    /// Ends the stream. An unterminated final line is decoded as if it had
    /// its newline; `fallback_model` is used when no event named a model.
    pub fn finish(mut self, fallback_model: &str) -> Result<(Vec<String>, Response), ClaudeError> {
        let mut deltas = Vec::new();
        if !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            if let Some(delta) = self.decode_line(&line)? {
                deltas.push(delta);
            }
        }
        if self.skipped > 0 {
            warn!("Stream finished with {} malformed line(s) skipped", self.skipped);
        }

        let response = Response {
            content: self.content,
            id: self.id.unwrap_or_default(),
            model: self.model.unwrap_or_else(|| fallback_model.to_string()),
            usage: self.usage,
            stop_reason: self.stop_reason,
        };
        Ok((deltas, response))
    }

    /// Text accumulated so far.
    pub fn content(&self) -> &str {
        &self.content
    }

    fn decode_line(&mut self, raw: &[u8]) -> Result<Option<String>, ClaudeError> {
        let line = match std::str::from_utf8(raw) {
            Ok(line) => line.trim_end_matches('\r'),
            Err(e) => {
                warn!("Skipping stream line that is not valid UTF-8: {}", e);
                self.skipped += 1;
                return Ok(None);
            }
        };

        if line.trim().is_empty() {
            return Ok(None);
        }
        let Some(data) = line.strip_prefix(DATA_PREFIX) else {
            return Ok(None);
        };
        let data = data.strip_prefix(' ').unwrap_or(data);
        if data == DONE_MARKER {
            return Ok(None);
        }

        let event = match serde_json::from_str::<StreamEvent>(data) {
            Ok(event) => event,
            Err(e) => {
                warn!("Skipping malformed stream event: {} for data: {}", e, data);
                self.skipped += 1;
                return Ok(None);
            }
        };

        self.apply(event)
    }

    fn apply(&mut self, event: StreamEvent) -> Result<Option<String>, ClaudeError> {
        if let Some(id) = event.message_id {
            self.id = Some(id);
        }
        if let Some(model) = event.model {
            self.model = Some(model);
        }
        if let Some(message) = event.message {
            if let Some(id) = message.id {
                self.id = Some(id);
            }
            if let Some(model) = message.model {
                self.model = Some(model);
            }
            if let Some(usage) = message.usage {
                self.merge_usage(usage);
            }
        }
        if let Some(usage) = event.usage {
            self.merge_usage(usage);
        }

        match event.kind.as_deref() {
            Some(TEXT_DELTA_EVENT) => {
                let text = event.delta.and_then(|d| d.text).filter(|t| !t.is_empty());
                if let Some(text) = &text {
                    self.content.push_str(text);
                }
                Ok(text)
            }
            Some(ERROR_EVENT) => {
                let error = event.error.unwrap_or(EventError { kind: None, message: None });
                let status = status_for_error_type(error.kind.as_deref());
                Err(ClaudeError::Api {
                    status,
                    message: error.message.unwrap_or_else(|| "stream reported an error".to_string()),
                    error_type: error.kind,
                })
            }
            Some(other) => {
                if let Some(reason) = event.delta.and_then(|d| d.stop_reason) {
                    self.stop_reason = Some(reason);
                }
                debug!("Stream event: {}", other);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn merge_usage(&mut self, usage: PartialUsage) {
        let current = self.usage.get_or_insert_with(Usage::default);
        if let Some(input) = usage.input_tokens {
            current.input_tokens = input;
        }
        if let Some(output) = usage.output_tokens {
            current.output_tokens = output;
        }
    }
}
