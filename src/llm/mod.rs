pub mod claude;
pub mod request;
pub mod stream;
pub mod transport;

use std::time::Duration;

pub use claude::{ Claude, MessageStream, StreamUpdate };
pub use request::{ build_request, MessagesRequest };
pub use stream::StreamDecoder;
pub use transport::{ ByteStream, HttpTransport, Transport };

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
pub const DEFAULT_MODEL: &str = "claude-3-opus-20240229";
pub const DEFAULT_API_VERSION: &str = "2023-06-01";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Settings fixed for the lifetime of one client. Only the model can change
/// afterwards, through `Claude::set_model`.
#[derive(Debug, Clone)]
pub struct ClaudeConfig {
    pub api_key: String,
    pub session_id: String,
    pub base_url: String,
    pub model: String,
    /// Value of the protocol-version header sent with every request.
    pub api_version: String,
    /// Number of past turns sent with each request. `None` sends the whole
    /// history.
    pub max_history_turns: Option<usize>,
    pub request_timeout: Option<Duration>,
}

impl ClaudeConfig {
    pub fn new(api_key: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            session_id: session_id.into(),
            ..Self::default()
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

impl Default for ClaudeConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            session_id: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            max_history_turns: None,
            request_timeout: None,
        }
    }
}

/// Per-call knobs. They apply to a single request and never touch the
/// client's configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOptions {
    pub stream: bool,
    pub temperature: f32,
    pub max_tokens: u32,
    pub system: Option<String>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            stream: false,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            system: None,
        }
    }
}

impl RequestOptions {
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }
}
