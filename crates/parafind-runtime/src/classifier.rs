//! Resilient classifier client.
//!
//! One request per prompt: the run's system instruction plus
//! `"Analyze this prompt: {prompt}"`. Transient provider failures are
//! retried with exponential backoff; the model's text goes through the
//! response extractor, which never fails. What this client cannot recover
//! from is returned as a [`ClassifierError`] and the caller decides the
//! fallback record.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use backon::Retryable;
use parafind_core::{RawClassification, ResponseExtractor};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::ClassificationCache;
use crate::prompts::{user_message, SystemInstruction};
use crate::providers::{ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError};
use crate::resilience::RetryPolicy;
use crate::usage::LlmUsage;

/// Errors from a classification call.
#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("Classification failed after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: ProviderError,
    },

    #[error("Classification failed: {0}")]
    Fatal(#[source] ProviderError),
}

/// Classifier client shared by all workers of a run.
pub struct ClassifierClient {
    provider: Arc<dyn LlmProvider>,
    instruction: SystemInstruction,
    completion: CompletionConfig,
    retry: RetryPolicy,
    extractor: ResponseExtractor,
    cache: Option<ClassificationCache>,
    usage: Mutex<LlmUsage>,
}

impl ClassifierClient {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        instruction: SystemInstruction,
        completion: CompletionConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            instruction,
            completion,
            retry,
            extractor: ResponseExtractor::new(),
            cache: None,
            usage: Mutex::new(LlmUsage::default()),
        }
    }

    /// Reuse raw classifications for repeated prompts.
    pub fn with_cache(mut self, cache: Option<ClassificationCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Replace the extraction strategy chain.
    pub fn with_extractor(mut self, extractor: ResponseExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    /// Classify one prompt.
    pub async fn classify(&self, prompt: &str, index: u64) -> Result<RawClassification, ClassifierError> {
        if let Some(cache) = &self.cache {
            if let Some(raw) = cache.get(prompt).await {
                debug!(index, "Classification served from cache");
                self.usage.lock().add_cache_hit();
                return Ok(raw);
            }
        }

        let response = self.complete_with_retry(prompt, index).await?;
        self.usage.lock().add(&response.usage, &response.model);

        let raw = self.extractor.extract(&response.content, prompt);

        if let Some(cache) = &self.cache {
            cache.insert(prompt.to_string(), raw.clone()).await;
        }

        Ok(raw)
    }

    /// Snapshot of token usage so far.
    pub fn usage(&self) -> LlmUsage {
        self.usage.lock().clone()
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Local readiness of the provider; sends nothing.
    pub async fn is_ready(&self) -> bool {
        self.provider.health_check().await
    }

    fn messages(&self, prompt: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(self.instruction.as_str()),
            ChatMessage::user(user_message(prompt)),
        ]
    }

    async fn complete_with_retry(
        &self,
        prompt: &str,
        index: u64,
    ) -> Result<CompletionResponse, ClassifierError> {
        let attempts = AtomicU32::new(0);

        let call = || {
            attempts.fetch_add(1, Ordering::Relaxed);
            self.provider.complete(self.messages(prompt), &self.completion)
        };

        call.retry(self.retry.backoff())
            .sleep(tokio::time::sleep)
            .when(ProviderError::is_retryable)
            .notify(|err: &ProviderError, delay: Duration| {
                warn!(
                    index,
                    error = %err,
                    delay = ?delay,
                    "Classifier call failed, retrying"
                );
            })
            .await
            .map_err(|source| {
                let attempts = attempts.load(Ordering::Relaxed);
                if source.is_retryable() {
                    ClassifierError::Exhausted { attempts, source }
                } else {
                    ClassifierError::Fatal(source)
                }
            })
    }
}

impl std::fmt::Debug for ClassifierClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassifierClient")
            .field("provider", &self.provider.name())
            .field("completion", &self.completion)
            .field("retry", &self.retry)
            .field("cache", &self.cache)
            .finish()
    }
}
