//! Anthropic Messages API client.
//!
//! The system instruction travels as a separate system block. With prompt
//! caching on it is marked `ephemeral`, so every prompt of a run after the
//! first reads it from Anthropic's cache instead of paying for it again.
//!
//! The key is resolved through [`CredentialSpec`] and only exposed when the
//! request header is built.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::debug;

use super::{
    factory::ProviderFactory,
    secrets::{ApiCredential, CredentialSource, CredentialSpec},
    ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError, TokenUsage,
};

/// Environment variable holding the Anthropic API key.
pub const ANTHROPIC_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";
const KEY_LABEL: &str = "Anthropic API key";

const ANTHROPIC_KEY: CredentialSpec = CredentialSpec::new(KEY_LABEL, "api_key", ANTHROPIC_API_KEY_ENV);

/// Classifier backend talking to `POST {base_url}/messages`.
pub struct AnthropicProvider {
    credential: ApiCredential,
    base_url: String,
    http: reqwest::Client,
}

impl std::fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_credential(ApiCredential::new(
            api_key,
            CredentialSource::Programmatic,
            KEY_LABEL,
        ))
    }

    fn with_credential(credential: ApiCredential) -> Self {
        Self {
            credential,
            base_url: DEFAULT_BASE_URL.to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn from_env() -> Result<Self, ProviderError> {
        ANTHROPIC_KEY
            .resolve(&JsonValue::Null)
            .map(Self::with_credential)
    }

    /// Build from provider options: `api_key` (else `ANTHROPIC_API_KEY`)
    /// and an optional `base_url`.
    pub fn from_config(options: &JsonValue) -> Result<Self, ProviderError> {
        let credential = ANTHROPIC_KEY.resolve(options)?;

        let provider = Self::with_credential(credential);
        Ok(match options["base_url"].as_str() {
            Some(url) => provider.with_base_url(url),
            None => provider,
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/messages", self.base_url)
    }
}

/// Split chat messages into system blocks and conversation turns.
fn messages_request(messages: Vec<ChatMessage>, config: &CompletionConfig) -> MessagesRequest {
    let (system, turns): (Vec<_>, Vec<_>) = messages.into_iter().partition(|m| m.role == "system");

    MessagesRequest {
        model: config.model.clone(),
        max_tokens: config.max_tokens,
        temperature: config.temperature,
        system: system
            .into_iter()
            .map(|m| SystemBlock {
                kind: "text",
                text: m.content,
                cache_control: config.prompt_caching.then_some(CacheControl { kind: "ephemeral" }),
            })
            .collect(),
        messages: turns
            .into_iter()
            .map(|m| Turn {
                role: m.role,
                content: m.content,
            })
            .collect(),
    }
}

/// Map a non-success HTTP status to a provider error.
///
/// `retry_after` is the raw `retry-after` header, `body` the raw response body.
fn status_error(status: u16, retry_after: Option<&str>, body: &str) -> ProviderError {
    match status {
        429 => ProviderError::RateLimited {
            retry_after: retry_after
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs),
        },
        401 | 403 => ProviderError::AuthError,
        _ => {
            let message = serde_json::from_str::<ErrorEnvelope>(body)
                .map(|envelope| envelope.error.message)
                .unwrap_or_else(|_| body.chars().take(200).collect());
            ProviderError::ApiError { status, message }
        }
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    system: Vec<SystemBlock>,
    messages: Vec<Turn>,
}

#[derive(Debug, Serialize)]
struct SystemBlock {
    #[serde(rename = "type")]
    kind: &'static str,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    cache_control: Option<CacheControl>,
}

#[derive(Debug, Serialize)]
struct CacheControl {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct Turn {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
    model: String,
    stop_reason: Option<String>,
    usage: ResponseUsage,
}

#[derive(Debug, Deserialize)]
struct ResponseBlock {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseUsage {
    input_tokens: u32,
    output_tokens: u32,
    #[serde(default)]
    cache_creation_input_tokens: u32,
    #[serde(default)]
    cache_read_input_tokens: u32,
}

impl From<ResponseUsage> for TokenUsage {
    fn from(usage: ResponseUsage) -> Self {
        Self {
            prompt_tokens: usage.input_tokens,
            completion_tokens: usage.output_tokens,
            cache_read_tokens: usage.cache_read_input_tokens,
            cache_creation_tokens: usage.cache_creation_input_tokens,
        }
    }
}

impl From<MessagesResponse> for CompletionResponse {
    fn from(body: MessagesResponse) -> Self {
        Self {
            content: body.content.into_iter().filter_map(|block| block.text).collect(),
            usage: body.usage.into(),
            model: body.model,
            stop_reason: body.stop_reason,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let request = messages_request(messages, config);

        let response = self
            .http
            .post(self.endpoint())
            .header("x-api-key", self.credential.expose())
            .header("anthropic-version", API_VERSION)
            .timeout(config.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(config.timeout)
                } else {
                    ProviderError::HttpError(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), retry_after.as_deref(), &body));
        }

        let body: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        debug!(
            model = %body.model,
            input_tokens = body.usage.input_tokens,
            cache_read = body.usage.cache_read_input_tokens,
            "Anthropic completion"
        );

        Ok(body.into())
    }

    async fn health_check(&self) -> bool {
        !self.credential.is_empty()
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

/// Builds [`AnthropicProvider`]s from provider options.
///
/// ```yaml
/// provider:
///   kind: anthropic
///   options:
///     api_key: sk-ant-...        # optional, else ANTHROPIC_API_KEY
///     base_url: https://...      # optional
/// ```
pub struct AnthropicProviderFactory;

impl ProviderFactory for AnthropicProviderFactory {
    fn kind(&self) -> &'static str {
        "anthropic"
    }

    fn create(&self, options: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        Ok(Arc::new(AnthropicProvider::from_config(options)?))
    }

    fn validate_options(&self, options: &JsonValue) -> Result<(), ProviderError> {
        ANTHROPIC_KEY.resolve(options)?;

        match options["base_url"].as_str() {
            Some(url) if !(url.starts_with("http://") || url.starts_with("https://")) => Err(
                ProviderError::NotConfigured(format!("base_url is not an http(s) URL: {}", url)),
            ),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_hides_key() {
        let provider = AnthropicProvider::new("sk-ant-secret");
        assert_eq!(provider.name(), "anthropic");
        assert!(!format!("{:?}", provider).contains("sk-ant-secret"));
    }

    #[test]
    fn test_request_splits_system_block() {
        let request = messages_request(
            vec![
                ChatMessage::system("Classify prompts."),
                ChatMessage::user("Analyze this prompt: Write 3 poems"),
            ],
            &CompletionConfig::default(),
        );
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["max_tokens"], 1024);
        assert_eq!(value["system"][0]["type"], "text");
        assert_eq!(value["system"][0]["text"], "Classify prompts.");
        assert_eq!(value["system"][0]["cache_control"]["type"], "ephemeral");
        assert_eq!(value["messages"].as_array().map(Vec::len), Some(1));
        assert_eq!(value["messages"][0]["role"], "user");
    }

    #[test]
    fn test_request_without_caching() {
        let config = CompletionConfig {
            prompt_caching: false,
            ..Default::default()
        };
        let request = messages_request(vec![ChatMessage::system("x"), ChatMessage::user("y")], &config);
        let value = serde_json::to_value(&request).unwrap();
        assert!(value["system"][0].get("cache_control").is_none());
    }

    #[test]
    fn test_status_errors() {
        assert!(matches!(
            status_error(429, Some("12"), ""),
            ProviderError::RateLimited { retry_after: Some(d) } if d == Duration::from_secs(12)
        ));
        assert!(matches!(status_error(401, None, ""), ProviderError::AuthError));

        let overloaded = status_error(
            529,
            None,
            r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#,
        );
        assert!(overloaded.is_retryable());
        assert!(matches!(overloaded, ProviderError::ApiError { status: 529, ref message } if message == "Overloaded"));

        let bad_request = status_error(400, None, "plain text body");
        assert!(!bad_request.is_retryable());
    }

    #[test]
    fn test_response_conversion() {
        let body: MessagesResponse = serde_json::from_value(serde_json::json!({
            "content": [{"type": "text", "text": "{\"parallelizable\": "}, {"type": "text", "text": "false}"}],
            "model": "claude-3-5-haiku-20241022",
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 900, "output_tokens": 12, "cache_read_input_tokens": 850}
        }))
        .unwrap();

        let response = CompletionResponse::from(body);
        assert_eq!(response.content, "{\"parallelizable\": false}");
        assert_eq!(response.usage.cache_read_tokens, 850);
        assert_eq!(response.usage.cache_creation_tokens, 0);
    }

    #[test]
    fn test_factory() {
        let factory = AnthropicProviderFactory;
        let provider = factory
            .create(&serde_json::json!({ "api_key": "k", "base_url": "https://example.test/v1/" }))
            .unwrap();
        assert_eq!(provider.name(), "anthropic");

        let bad_url = serde_json::json!({ "api_key": "k", "base_url": "ftp://example.test" });
        assert!(factory.validate_options(&bad_url).is_err());
    }
}
