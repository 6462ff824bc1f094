//! Runtime configuration loaded from YAML.
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! configuration. Durations are human-readable strings: `"7s"`, `"1h"`.
//!
//! ```yaml
//! output:
//!   dir: ./out
//!   dataset: lmsys/lmsys-chat-1m
//! batch:
//!   size: 100
//!   workers: 3
//!   delay: 7s
//!   task_timeout: 90s
//! retry:
//!   max_attempts: 8
//!   factor: 3s
//! provider:
//!   kind: anthropic
//!   options:
//!     base_url: https://api.anthropic.com/v1
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::providers::CompletionConfig;
use crate::resilience::RetryPolicy;

/// Errors from configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to read system instruction {path}: {source}")]
    Instruction {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Serde adapter for `humantime` duration strings.
pub mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

/// Where results go.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// Directory holding the row store, stats and novel categories
    pub dir: PathBuf,

    /// Explicit file prefix; wins over `dataset`
    pub prefix: Option<String>,

    /// Dataset name the prefix is derived from, e.g. `lmsys/lmsys-chat-1m`
    pub dataset: Option<String>,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            prefix: None,
            dataset: None,
        }
    }
}

/// Batch scheduling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    /// Corpus records per batch
    pub size: usize,

    /// Concurrent classification workers within a batch
    pub workers: usize,

    /// Prompts shorter than this (in characters) are skipped
    pub min_prompt_chars: usize,

    /// Pause between batches
    #[serde(with = "duration_str")]
    pub delay: Duration,

    /// How long one prompt may run, once a worker slot is held, before it
    /// is counted as failed. The worker is not cancelled.
    #[serde(with = "duration_str")]
    pub task_timeout: Duration,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            size: 100,
            workers: 3,
            min_prompt_chars: 10,
            delay: Duration::from_secs(7),
            task_timeout: Duration::from_secs(90),
        }
    }
}

/// Which provider factory to use and its options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub kind: String,
    pub options: JsonValue,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            kind: "anthropic".to_string(),
            options: JsonValue::Object(Default::default()),
        }
    }
}

/// Raw classification cache keyed by prompt text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    pub max_entries: u64,
    #[serde(with = "duration_str")]
    pub ttl: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 10_000,
            ttl: Duration::from_secs(3600),
        }
    }
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub output: OutputSettings,

    /// File holding the classifier system instruction; built-in text if unset
    pub system_instruction: Option<PathBuf>,

    pub batch: BatchSettings,
    pub retry: RetryPolicy,
    pub completion: CompletionConfig,
    pub provider: ProviderSettings,
    pub cache: CacheSettings,
}

impl RuntimeConfig {
    /// Parse a configuration from YAML text.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    /// Reject values the runner cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch.size == 0 {
            return Err(ConfigError::Invalid("batch.size must be at least 1".to_string()));
        }
        if self.batch.workers == 0 {
            return Err(ConfigError::Invalid("batch.workers must be at least 1".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".to_string()));
        }
        if self.retry.base < 1.0 {
            return Err(ConfigError::Invalid("retry.base must be at least 1".to_string()));
        }
        if self.completion.max_tokens == 0 {
            return Err(ConfigError::Invalid("completion.max_tokens must be at least 1".to_string()));
        }
        Ok(())
    }

    /// File prefix for this run: explicit prefix, else derived from the dataset.
    pub fn resolve_prefix(&self) -> Result<String, ConfigError> {
        if let Some(prefix) = self.output.prefix.as_deref().filter(|p| !p.is_empty()) {
            return Ok(prefix.to_string());
        }
        self.output
            .dataset
            .as_deref()
            .and_then(dataset_prefix)
            .ok_or_else(|| {
                ConfigError::Invalid("output.prefix or output.dataset is required".to_string())
            })
    }
}

/// Derive a file prefix from a dataset name.
///
/// `lmsys/lmsys-chat-1m` → `lmsys`, `allenai/WildChat-1M` → `wildchat`.
pub fn dataset_prefix(dataset: &str) -> Option<String> {
    let head = dataset.split('-').next()?;
    let name = head.split('/').nth(1).unwrap_or(head);
    let prefix = name.trim().to_lowercase();
    (!prefix.is_empty()).then_some(prefix)
}
