//! LM Studio chat-completion client.
//!
//! Talks to the OpenAI-compatible endpoints LM Studio exposes:
//! `POST /v1/chat/completions` and `GET /v1/models`.

use super::AiError;
use crate::config::AiConfig;
use crate::retry::{retry_result, RetryPolicy};
use crate::testing::AiBackend;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Default LM Studio server address.
pub const DEFAULT_BASE_URL: &str = "http://localhost:1234";

/// Default request timeout; local models are slow on large prompts.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Default number of attempts per request.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default model identifier sent with each request.
pub const DEFAULT_MODEL: &str = "local-model";

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ChatReplyMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelInfo>,
}

/// One entry of the server's model list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ModelInfo {
    pub id: String,
    #[serde(default)]
    pub owned_by: Option<String>,
}

/// Outcome of [`LmStudioClient::health_check`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum HealthReport {
    Healthy {
        base_url: String,
        models_available: usize,
        /// First few model ids.
        models: Vec<String>,
    },
    Unhealthy {
        base_url: String,
        error: String,
    },
}

impl HealthReport {
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy { .. })
    }
}

/// Pull the first choice's content out of a chat-completion body.
fn parse_chat_response(body: &str) -> Result<String, AiError> {
    let response: ChatResponse =
        serde_json::from_str(body).map_err(|e| AiError::InvalidResponse {
            message: e.to_string(),
        })?;
    response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .ok_or(AiError::EmptyResponse)
}

// =============================================================================
// Client
// =============================================================================

/// HTTP client for an LM Studio server.
#[derive(Debug, Clone)]
pub struct LmStudioClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
    max_retries: u32,
    retry_delay: Duration,
}

impl LmStudioClient {
    /// Create a client for the given server with default settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(base_url: impl Into<String>) -> Result<Self, AiError> {
        Self::build(
            base_url.into(),
            DEFAULT_MODEL.to_string(),
            None,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            DEFAULT_MAX_RETRIES,
            Duration::from_millis(1000),
        )
    }

    /// Create a client from the `ai` section of the project config.
    ///
    /// The API key, if any, is read from the environment variable named by
    /// `api_key_env`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn from_config(config: &AiConfig) -> Result<Self, AiError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.is_empty());
        Self::build(
            config.base_url.clone(),
            config.model.clone(),
            api_key,
            Duration::from_secs(config.timeout_secs),
            config.max_retries,
            Duration::from_millis(config.retry_delay_ms),
        )
    }

    fn build(
        base_url: String,
        model: String,
        api_key: Option<String>,
        timeout: Duration,
        max_retries: u32,
        retry_delay: Duration,
    ) -> Result<Self, AiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AiError::ServerUnavailable {
                base_url: base_url.clone(),
                message: e.to_string(),
            })?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            api_key,
            timeout,
            max_retries,
            retry_delay,
        })
    }

    /// Set the model identifier.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the number of attempts and the delay between them.
    #[must_use]
    pub fn with_retries(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    /// Server base URL without trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn chat_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    fn models_url(&self) -> String {
        format!("{}/v1/models", self.base_url)
    }

    fn map_transport_error(&self, e: reqwest::Error) -> AiError {
        if e.is_timeout() {
            AiError::Timeout {
                timeout_secs: self.timeout.as_secs(),
            }
        } else {
            AiError::ServerUnavailable {
                base_url: self.base_url.clone(),
                message: e.to_string(),
            }
        }
    }

    async fn send_once(&self, request: reqwest::RequestBuilder) -> Result<String, AiError> {
        let request = match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        };
        let response = request
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.map_transport_error(e))?;
        if !status.is_success() {
            return Err(AiError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    /// Attempts and delay applied to every request.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.max_retries, self.retry_delay)
    }

    /// Send a request, retrying retryable failures with a fixed delay.
    async fn send_with_retry<F>(&self, make_request: F) -> Result<String, AiError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        retry_result(
            &self.retry_policy(),
            "AI request",
            || self.send_once(make_request()),
            AiError::is_retryable,
        )
        .await
    }

    /// List models loaded on the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the server is unreachable or answers garbage.
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, AiError> {
        let url = self.models_url();
        let body = self.send_with_retry(|| self.client.get(&url)).await?;
        let list: ModelList = serde_json::from_str(&body).map_err(|e| AiError::InvalidResponse {
            message: e.to_string(),
        })?;
        Ok(list.data)
    }

    /// Check the server by listing its models. Never fails.
    pub async fn health_check(&self) -> HealthReport {
        match self.list_models().await {
            Ok(models) => HealthReport::Healthy {
                base_url: self.base_url.clone(),
                models_available: models.len(),
                models: models.into_iter().take(3).map(|m| m.id).collect(),
            },
            Err(e) => HealthReport::Unhealthy {
                base_url: self.base_url.clone(),
                error: e.to_string(),
            },
        }
    }
}

#[async_trait]
impl AiBackend for LmStudioClient {
    async fn chat(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, AiError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            max_tokens,
            temperature,
            stream: false,
        };
        debug!(
            "Chat request to {} (model={}, max_tokens={}, temperature={})",
            self.base_url, self.model, max_tokens, temperature
        );

        let url = self.chat_url();
        let body = self
            .send_with_retry(|| self.client.post(&url).json(&request))
            .await?;
        parse_chat_response(&body)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
