//! Generation service abstraction and implementations.
//!
//! Defines the [`GenerationService`] port that the answer mediator talks to,
//! and two concrete services:
//! - **[`DisabledService`]**: fails every call; used when `generation.provider = "disabled"`.
//! - **[`ChatCompletionsService`]**: calls an OpenAI-compatible
//!   `POST {base_url}/chat/completions` endpoint (Groq by default).
//!
//! A service makes exactly one remote call per [`generate`](GenerationService::generate).
//! Timeouts, retries and cancellation belong to [`crate::mediator`].
//!
//! # Provider Selection
//!
//! ```rust,no_run
//! # use counsel::config::GenerationConfig;
//! # use counsel::generation::create_service;
//! let mut config = GenerationConfig::default();
//! config.provider = "disabled".to_string();
//! let service = create_service(&config).unwrap();
//! assert_eq!(service.model(), "disabled");
//! ```

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::GenerationConfig;
use crate::models::Prompt;

/// Failure of a single generation call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("generation timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("generation service returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("invalid response from generation service: {0}")]
    InvalidResponse(String),
    #[error("generation is disabled")]
    Disabled,
}

impl GenerationError {
    /// Whether another attempt could reasonably succeed.
    ///
    /// Timeouts, transport failures, HTTP 429 and 5xx are transient.
    /// Other client errors (bad key, bad request) are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            GenerationError::Timeout | GenerationError::Transport(_) => true,
            GenerationError::Status { status, .. } => *status == 429 || *status >= 500,
            GenerationError::InvalidResponse(_) | GenerationError::Disabled => false,
        }
    }
}

/// A text generation backend.
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Sends `prompt` and returns the raw reply text (possibly empty).
    async fn generate(&self, prompt: &Prompt) -> Result<String, GenerationError>;

    /// Returns the model identifier (e.g. `"llama-3.3-70b-versatile"`).
    fn model(&self) -> &str;
}

// ============ Disabled Service ============

/// A generation service that refuses every call.
pub struct DisabledService;

#[async_trait]
impl GenerationService for DisabledService {
    async fn generate(&self, _prompt: &Prompt) -> Result<String, GenerationError> {
        Err(GenerationError::Disabled)
    }

    fn model(&self) -> &str {
        "disabled"
    }
}

// ============ Chat Completions Service ============

/// Generation service backed by an OpenAI-compatible chat completions API.
pub struct ChatCompletionsService {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    max_tokens: u32,
    temperature: f32,
}

impl ChatCompletionsService {
    /// Create a service from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the environment variable named by
    /// `generation.api_key_env` is unset or empty.
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = match config.api_key() {
            Some(key) => key,
            None => bail!("{} environment variable not set", config.api_key_env),
        };
        Self::with_key(config, api_key)
    }

    /// Create a service with an explicit API key.
    pub fn with_key(config: &GenerationConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl GenerationService for ChatCompletionsService {
    async fn generate(&self, prompt: &Prompt) -> Result<String, GenerationError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": prompt.system },
                { "role": "user", "content": prompt.user },
            ],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                message: truncate_message(&message),
            });
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;
        parse_chat_response(&json)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

fn transport_error(e: reqwest::Error) -> GenerationError {
    if e.is_timeout() {
        GenerationError::Timeout
    } else {
        GenerationError::Transport(e.to_string())
    }
}

/// Error bodies can be large HTML pages; keep only the start.
fn truncate_message(message: &str) -> String {
    const MAX: usize = 300;
    if message.chars().count() <= MAX {
        message.to_string()
    } else {
        let head: String = message.chars().take(MAX).collect();
        format!("{}...", head)
    }
}

/// Extracts `choices[0].message.content`. A null content is an empty reply.
fn parse_chat_response(json: &serde_json::Value) -> Result<String, GenerationError> {
    let message = json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .ok_or_else(|| GenerationError::InvalidResponse("missing choices[0].message".into()))?;

    match message.get("content") {
        Some(serde_json::Value::String(s)) => Ok(s.clone()),
        Some(serde_json::Value::Null) | None => Ok(String::new()),
        Some(other) => Err(GenerationError::InvalidResponse(format!(
            "unexpected content type: {}",
            other
        ))),
    }
}

/// Create the appropriate [`GenerationService`] based on configuration.
///
/// | Config Value | Service |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledService`] |
/// | `"openai-compatible"` | [`ChatCompletionsService`] |
pub fn create_service(config: &GenerationConfig) -> Result<Arc<dyn GenerationService>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledService)),
        "openai-compatible" => {
            let service = ChatCompletionsService::new(config)?;
            tracing::debug!(model = %service.model, endpoint = %service.endpoint, "generation service ready");
            Ok(Arc::new(service))
        }
        other => bail!("Unknown generation provider: {}", other),
    }
}
