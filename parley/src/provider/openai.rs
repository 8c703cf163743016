//! `OpenAI` Chat Completions client.
//!
//! Talks to `{base_url}/chat/completions` with bearer authentication. Buffered
//! calls return the first choice's message; streamed calls decode the SSE body
//! into [`ChunkDelta`]s.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};

use super::streaming::SseStreamParser;
use super::{ChunkDelta, CompletionService, DeltaStream};
use crate::builder::CompletionParams;
use crate::error::{ConfigError, ConfigResult, ServiceError};
use crate::message::ChatMessage;

/// Default `OpenAI` API base URL.
pub const OPENAI_API_BASE_URL: &str = "https://api.openai.com/v1";

/// `OpenAI` API client.
///
/// Works against the official API and compatible proxies.
///
/// ```rust,ignore
/// let client = OpenAIClient::builder()
///     .api_key("sk-...")
///     .base_url("https://my-openai-proxy.com/v1")
///     .build()?;
/// ```
#[derive(Clone)]
pub struct OpenAIClient {
    http_client: reqwest::Client,
    api_key: Arc<str>,
    base_url: Arc<str>,
}

impl std::fmt::Debug for OpenAIClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAIClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

impl OpenAIClient {
    /// Create a client for the default base URL.
    pub fn new(api_key: impl Into<String>) -> ConfigResult<Self> {
        Self::builder().api_key(api_key).build()
    }

    /// Create a new client builder.
    #[must_use]
    pub fn builder() -> OpenAIClientBuilder {
        OpenAIClientBuilder::default()
    }

    /// Base URL requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn auth_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::with_capacity(2);
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", self.api_key)) {
            headers.insert(AUTHORIZATION, value);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }

    async fn send(&self, params: &CompletionParams) -> Result<reqwest::Response, ServiceError> {
        let response = self
            .http_client
            .post(self.endpoint())
            .headers(self.auth_headers())
            .json(params)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let body = serde_json::from_str::<Value>(&text).unwrap_or_else(|_| Value::String(text));
        debug!(status = status.as_u16(), "completion request rejected");
        Err(ServiceError::upstream(status.as_u16(), body))
    }
}

/// Decode one SSE payload into a delta. Chunks without choices yield `None`.
///
/// A payload that is not a valid chunk, whether unparseable or of the wrong
/// shape, is an upstream error carrying the raw payload.
fn parse_chunk(status: u16, data: &str) -> Option<Result<ChunkDelta, ServiceError>> {
    let malformed = || ServiceError::upstream(status, Value::String(data.into()));
    let Ok(value) = serde_json::from_str::<Value>(data) else {
        return Some(Err(malformed()));
    };
    if value.get("error").is_some() {
        return Some(Err(ServiceError::upstream(status, value)));
    }
    match serde_json::from_value::<StreamChunk>(value) {
        Ok(chunk) => chunk.choices.into_iter().next().map(|c| Ok(c.delta)),
        Err(e) => {
            debug!(error = %e, "malformed stream chunk");
            Some(Err(malformed()))
        }
    }
}

#[async_trait]
impl CompletionService for OpenAIClient {
    fn provider(&self) -> &'static str {
        "openai"
    }

    #[instrument(skip(self, params), fields(model = %params.model))]
    async fn complete(&self, params: &CompletionParams) -> Result<ChatMessage, ServiceError> {
        let mut params = params.clone();
        params.stream = false;

        debug!(messages = params.messages.len(), "sending completion request");
        let response = self.send(&params).await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        let parsed: CompletionResponse = serde_json::from_str(&text)
            .map_err(|_| ServiceError::upstream(status, Value::String(text.clone())))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| ServiceError::upstream(status, Value::String(text)))
    }

    #[instrument(skip(self, params), fields(model = %params.model))]
    async fn complete_stream(&self, params: &CompletionParams) -> Result<DeltaStream, ServiceError> {
        let mut params = params.clone();
        params.stream = true;

        debug!(messages = params.messages.len(), "sending streaming completion request");
        let response = self.send(&params).await?;
        let status = response.status().as_u16();

        let stream = SseStreamParser::new(Box::pin(response.bytes_stream())).filter_map(
            move |item| {
                let delta = match item {
                    Ok(data) => parse_chunk(status, &data),
                    Err(e) => Some(Err(e)),
                };
                futures::future::ready(delta)
            },
        );
        Ok(Box::pin(stream))
    }
}

/// Builder for [`OpenAIClient`].
#[derive(Debug, Default)]
pub struct OpenAIClientBuilder {
    api_key: Option<String>,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

impl OpenAIClientBuilder {
    /// Set the API key.
    #[must_use]
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set a custom base URL.
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the request timeout in seconds. Default is no timeout.
    #[must_use]
    pub const fn timeout_secs(mut self, timeout: u64) -> Self {
        self.timeout_secs = Some(timeout);
        self
    }

    /// Build the client.
    ///
    /// Fails when no API key was given or the HTTP client cannot be built.
    pub fn build(self) -> ConfigResult<OpenAIClient> {
        let api_key = self
            .api_key
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ConfigError::missing("api_key"))?;
        let base_url = self
            .base_url
            .unwrap_or_else(|| OPENAI_API_BASE_URL.to_string());

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = self.timeout_secs {
            builder = builder.timeout(Duration::from_secs(timeout));
        }
        let http_client = builder
            .build()
            .map_err(|e| ConfigError::invalid(format!("HTTP client: {e}")))?;

        Ok(OpenAIClient {
            http_client,
            api_key: api_key.into(),
            base_url: base_url.into(),
        })
    }
}
