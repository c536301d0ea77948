//! OpenRouter API client

use super::streaming::ChatStream;
use super::types::{ApiErrorEnvelope, ChatCompletion, ChatRequest};
use crate::config::ApiConfig;
use crate::error::{Result, StudioError};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

/// Anything that can answer a chat-completion request
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Fail with [`StudioError::MissingApiKey`] when no credential is configured
    fn ensure_api_key(&self) -> Result<()>;

    /// Single non-streaming call
    async fn complete(&self, request: ChatRequest) -> Result<ChatCompletion>;

    /// Streaming call, read incrementally through [`ChatStream`]
    async fn stream(&self, request: ChatRequest) -> Result<ChatStream>;
}

/// OpenRouter chat-completions client
pub struct OpenRouterClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    api_key_env: String,
    app_title: Option<String>,
}

impl OpenRouterClient {
    /// Create a client reading its key from the configured environment variable
    pub fn new(config: &ApiConfig) -> Result<Self> {
        Self::with_api_key(config, config.api_key())
    }

    /// Create a client with an explicit key
    pub fn with_api_key(config: &ApiConfig, api_key: Option<String>) -> Result<Self> {
        if api_key.is_none() {
            warn!("{} environment variable not found.", config.api_key_env);
        }

        // Long total timeout for streamed replies, read timeout for stalled connections
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .read_timeout(Duration::from_secs(config.read_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            api_key_env: config.api_key_env.clone(),
            app_title: config.app_title.clone(),
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    async fn send(&self, request: &ChatRequest) -> Result<reqwest::Response> {
        self.ensure_api_key()?;
        let key = self.api_key.as_deref().unwrap_or_default();

        debug!(
            model = %request.model,
            messages = request.messages.len(),
            stream = request.stream,
            "sending chat completion"
        );

        let mut builder = self
            .client
            .post(self.endpoint())
            .bearer_auth(key)
            .json(request);
        if let Some(title) = &self.app_title {
            builder = builder.header("X-Title", title);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await?;
            return Err(api_error(status.as_u16(), &body));
        }

        Ok(response)
    }
}

#[async_trait]
impl CompletionBackend for OpenRouterClient {
    fn ensure_api_key(&self) -> Result<()> {
        match &self.api_key {
            Some(_) => Ok(()),
            None => Err(StudioError::MissingApiKey(self.api_key_env.clone())),
        }
    }

    async fn complete(&self, mut request: ChatRequest) -> Result<ChatCompletion> {
        request.stream = false;
        let response = self.send(&request).await?;
        let text = response.text().await?;
        let completion: ChatCompletion = serde_json::from_str(&text)?;

        if let Some(error) = &completion.error {
            return Err(StudioError::Api {
                status: error.status().unwrap_or(200),
                message: error.message.clone(),
            });
        }
        if completion.choices.is_empty() {
            return Err(StudioError::EmptyResponse);
        }

        Ok(completion)
    }

    async fn stream(&self, mut request: ChatRequest) -> Result<ChatStream> {
        request.stream = true;
        let response = self.send(&request).await?;
        Ok(ChatStream::from_response(response))
    }
}

/// Build an API error, preferring the provider's `error.message` over the raw body
pub fn api_error(status: u16, body: &str) -> StudioError {
    let message = match serde_json::from_str::<ApiErrorEnvelope>(body) {
        Ok(envelope) => envelope.error.message,
        Err(_) if body.trim().is_empty() => reqwest::StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("unknown error")
            .to_string(),
        Err(_) => body.trim().to_string(),
    };
    StudioError::Api { status, message }
}
