//! # parafind-runtime
//!
//! LLM classification and resumable batch processing for parafind.
//!
//! This crate owns everything with side effects: the provider client,
//! retries, the stores on disk and the batch runner. Deciding whether a
//! classification is believable is left to `parafind-core`, which never
//! touches the network or the filesystem.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use parafind_runtime::{
//!     build_classifier, BatchRunner, JsonlCorpus, ProviderRegistry, RunContext,
//!     RuntimeConfig, ShutdownSignal,
//! };
//!
//! let config = RuntimeConfig::from_yaml_file("parafind.yaml")?;
//! let classifier = build_classifier(&config, &ProviderRegistry::with_defaults())?;
//! let context = RunContext::init(&config.output.dir, &config.resolve_prefix()?)?;
//! let corpus = JsonlCorpus::open("lmsys.jsonl")?;
//!
//! let (_handle, signal) = ShutdownSignal::channel();
//! let mut runner = BatchRunner::new(
//!     Arc::new(corpus),
//!     Arc::new(classifier),
//!     Arc::new(context),
//!     config.batch.clone(),
//! );
//! let summary = runner.run(signal).await?;
//! ```

use thiserror::Error;

pub mod cache;
pub mod classifier;
pub mod config;
pub mod context;
pub mod corpus;
pub mod prompts;
pub mod providers;
pub mod resilience;
pub mod runner;
pub mod store;
pub mod usage;

pub use cache::ClassificationCache;
pub use classifier::{ClassifierClient, ClassifierError};
pub use config::{
    dataset_prefix, BatchSettings, CacheSettings, ConfigError, OutputSettings, ProviderSettings,
    RuntimeConfig,
};
pub use context::RunContext;
pub use corpus::{ChatTurn, ConversationRecord, Corpus, CorpusError, InMemoryCorpus, JsonlCorpus};
pub use prompts::{user_message, SystemInstruction, DEFAULT_SYSTEM_INSTRUCTION};
pub use providers::{
    ApiCredential, ChatMessage, CompletionConfig, CompletionResponse, CredentialSource, CredentialSpec,
    LlmProvider, ProviderError, ProviderFactory, ProviderRegistry, TokenUsage,
};
pub use resilience::RetryPolicy;
pub use runner::{new_query_id, BatchRunner, RunState, RunSummary, ShutdownHandle, ShutdownSignal};
pub use store::{JsonFileStore, ResultStore, RowRecord, StoreError, StorePaths};
pub use usage::LlmUsage;

/// Errors from the runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Corpus error: {0}")]
    Corpus(#[from] CorpusError),
}

/// Build the classifier client described by `config`.
///
/// Loads the system instruction, creates the provider through `registry`
/// and attaches the classification cache when enabled.
pub fn build_classifier(
    config: &RuntimeConfig,
    registry: &ProviderRegistry,
) -> Result<ClassifierClient, RuntimeError> {
    let instruction = SystemInstruction::load(config.system_instruction.as_deref())?;
    let provider = registry.create_from_settings(&config.provider)?;

    Ok(ClassifierClient::new(
        provider,
        instruction,
        config.completion.clone(),
        config.retry.clone(),
    )
    .with_cache(ClassificationCache::from_settings(&config.cache)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_provider_kind() {
        let mut config = RuntimeConfig::default();
        config.provider.kind = "carrier-pigeon".to_string();

        let err = build_classifier(&config, &ProviderRegistry::new()).unwrap_err();
        assert!(matches!(err, RuntimeError::Provider(ProviderError::NotConfigured(_))));
    }

    #[test]
    fn test_missing_instruction_file() {
        let mut config = RuntimeConfig::default();
        config.system_instruction = Some("/nonexistent/parafind/system.txt".into());

        let err = build_classifier(&config, &ProviderRegistry::new()).unwrap_err();
        assert!(matches!(err, RuntimeError::Config(ConfigError::Instruction { .. })));
    }
}
