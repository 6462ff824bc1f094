//! Classifier backends.
//!
//! [`LlmProvider`] is the seam between the classifier and a model API. The
//! Anthropic backend sits behind the `anthropic` feature; tests plug in
//! scripted providers. Keys go through [`secrets`] and never reach a log line.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

mod factory;
pub mod secrets;

#[cfg(feature = "anthropic")]
mod anthropic;

pub use factory::{ProviderFactory, ProviderRegistry};
pub use secrets::{ApiCredential, CredentialSource, CredentialSpec};

#[cfg(feature = "anthropic")]
pub use anthropic::{AnthropicProvider, AnthropicProviderFactory, ANTHROPIC_API_KEY_ENV};

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    HttpError(String),

    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API returned {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("unreadable response body: {0}")]
    ParseError(String),

    #[error("API key rejected")]
    AuthError,

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("provider not configured: {0}")]
    NotConfigured(String),
}

/// HTTP status Anthropic uses for an overloaded API.
pub const STATUS_OVERLOADED: u16 = 529;

impl ProviderError {
    /// Whether a retry may succeed.
    ///
    /// Network failures, timeouts, rate limits and server-side errors are
    /// transient. Authentication, bad requests, unparseable bodies and
    /// missing configuration are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::HttpError(_) | Self::Timeout(_) | Self::RateLimited { .. } => true,
            Self::ApiError { status, .. } => *status >= 500 || *status == STATUS_OVERLOADED,
            Self::ParseError(_) | Self::AuthError | Self::NotConfigured(_) => false,
        }
    }
}

/// Per-request model settings, the `completion` section of the config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    #[serde(with = "crate::config::duration_str")]
    pub timeout: Duration,
    /// Ask the API to cache the system instruction across prompts.
    pub prompt_caching: bool,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: "claude-3-5-haiku-20241022".to_string(),
            max_tokens: 1024,
            temperature: 0.2,
            timeout: Duration::from_secs(60),
            prompt_caching: true,
        }
    }
}

/// One message of a request; `role` is `system`, `user` or `assistant`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    fn with_role(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role("user", content)
    }
}

/// The raw text a model returned, before any JSON is pulled out of it.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub usage: TokenUsage,
    pub model: String,
    pub stop_reason: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    /// Prompt tokens served from the provider's prompt cache
    pub cache_read_tokens: u32,
    pub cache_creation_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// A model API the classifier can send one prompt to.
///
/// Only [`ClassifierClient`](crate::ClassifierClient) calls this; validation
/// never leaves the process.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError>;

    /// Cheap local readiness check; makes no request.
    async fn health_check(&self) -> bool;

    /// Used in log fields.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_roles() {
        assert_eq!(ChatMessage::system("You classify prompts.").role, "system");
        assert_eq!(ChatMessage::user("Analyze this prompt: hi").content, "Analyze this prompt: hi");

        let usage = TokenUsage {
            prompt_tokens: 900,
            completion_tokens: 30,
            cache_read_tokens: 850,
            ..Default::default()
        };
        assert_eq!(usage.total(), 930);
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ProviderError::HttpError("reset".into()).is_retryable());
        assert!(ProviderError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(ProviderError::RateLimited { retry_after: None }.is_retryable());
        assert!(ProviderError::ApiError { status: 503, message: String::new() }.is_retryable());
        assert!(ProviderError::ApiError { status: STATUS_OVERLOADED, message: String::new() }.is_retryable());

        assert!(!ProviderError::ApiError { status: 400, message: String::new() }.is_retryable());
        assert!(!ProviderError::AuthError.is_retryable());
        assert!(!ProviderError::NotConfigured("x".into()).is_retryable());
        assert!(!ProviderError::ParseError("x".into()).is_retryable());
    }

    #[test]
    fn test_completion_defaults() {
        let config = CompletionConfig::default();
        assert_eq!(config.max_tokens, 1024);
        assert!((config.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(config.timeout, Duration::from_secs(60));
    }
}
