use async_trait::async_trait;
use futures::{ Stream, StreamExt };
use log::{ debug, info };
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE } };
use std::pin::Pin;
use url::Url;

use super::ClaudeConfig;
use super::request::{ MessagesRequest, MessagesResponse };
use crate::error::ClaudeError;

pub const API_KEY_HEADER: &str = "x-api-key";
pub const VERSION_HEADER: &str = "anthropic-version";

/// Raw body chunks of a streaming response, exactly as the network delivers
/// them.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, ClaudeError>> + Send>>;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends a buffered request and waits for the complete body.
    async fn send(&self, payload: &MessagesRequest) -> Result<MessagesResponse, ClaudeError>;

    /// Opens a streaming request. Resolves once response headers arrive; the
    /// body is delivered through the returned stream.
    async fn open_stream(&self, payload: &MessagesRequest) -> Result<ByteStream, ClaudeError>;
}

pub struct HttpTransport {
    http: HttpClient,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(config: &ClaudeConfig) -> Result<Self, ClaudeError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            HeaderName::from_static(API_KEY_HEADER),
            HeaderValue::from_str(&config.api_key)
                .map_err(|e| ClaudeError::Config(format!("Invalid API key format: {}", e)))?
        );
        headers.insert(
            HeaderName::from_static(VERSION_HEADER),
            HeaderValue::from_str(&config.api_version)
                .map_err(|e| ClaudeError::Config(format!("Invalid API version: {}", e)))?
        );

        let mut builder = HttpClient::builder().default_headers(headers);
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| ClaudeError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let endpoint = messages_endpoint(&config.base_url)?;
        info!("Messages endpoint: {}", endpoint);

        Ok(Self { http, endpoint })
    }

    async fn post(&self, payload: &MessagesRequest) -> Result<reqwest::Response, ClaudeError> {
        let resp = self.http.post(&self.endpoint).json(payload).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClaudeError::from_error_body(status.as_u16(), &body));
        }
        Ok(resp)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, payload: &MessagesRequest) -> Result<MessagesResponse, ClaudeError> {
        debug!("Sending buffered request with {} message(s)", payload.messages.len());
        let body = self.post(payload).await?.text().await?;
        serde_json::from_str::<MessagesResponse>(&body).map_err(|e| {
            ClaudeError::Decode(format!("{} in body: {}", e, body))
        })
    }

    async fn open_stream(&self, payload: &MessagesRequest) -> Result<ByteStream, ClaudeError> {
        debug!("Opening stream with {} message(s)", payload.messages.len());
        let resp = self.post(payload).await?;
        let stream = resp
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(ClaudeError::from));
        Ok(Box::pin(stream))
    }
}

/// `{base_url}/messages`, tolerating a trailing slash on the base.
pub fn messages_endpoint(base_url: &str) -> Result<String, ClaudeError> {
    let trimmed = base_url.trim_end_matches('/');
    Url::parse(trimmed).map_err(|e| {
        ClaudeError::Config(format!("Invalid base URL '{}': {}", base_url, e))
    })?;
    Ok(format!("{}/messages", trimmed))
}
