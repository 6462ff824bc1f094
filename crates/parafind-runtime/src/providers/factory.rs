//! Provider factories, keyed by the `provider.kind` configuration value.
//!
//! ```ignore
//! let registry = ProviderRegistry::with_defaults();
//! let provider = registry.create_from_settings(&config.provider)?;
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use super::{LlmProvider, ProviderError};
use crate::config::ProviderSettings;

/// Builds one kind of provider from its `provider.options`.
pub trait ProviderFactory: Send + Sync {
    /// Matched against `provider.kind`.
    fn kind(&self) -> &'static str;

    fn create(&self, options: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError>;

    /// Reject unusable options before anything is built.
    fn validate_options(&self, _options: &JsonValue) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// Provider factories by kind.
#[derive(Default)]
pub struct ProviderRegistry {
    factories: BTreeMap<&'static str, Arc<dyn ProviderFactory>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in providers enabled by crate features.
    pub fn with_defaults() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new();
        #[cfg(feature = "anthropic")]
        registry.register(Arc::new(super::AnthropicProviderFactory));
        registry
    }

    /// Add a factory; a later one with the same kind wins.
    pub fn register(&mut self, factory: Arc<dyn ProviderFactory>) {
        self.factories.insert(factory.kind(), factory);
    }

    pub fn create(&self, kind: &str, options: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        self.factory(kind)?.create(options)
    }

    /// Validate then create the provider described by `settings`.
    pub fn create_from_settings(
        &self,
        settings: &ProviderSettings,
    ) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        let factory = self.factory(&settings.kind)?;
        factory.validate_options(&settings.options)?;
        factory.create(&settings.options)
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    fn factory(&self, kind: &str) -> Result<&Arc<dyn ProviderFactory>, ProviderError> {
        self.factories.get(kind).ok_or_else(|| {
            ProviderError::NotConfigured(format!(
                "unknown provider kind '{}', expected one of {:?}",
                kind,
                self.kinds()
            ))
        })
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
