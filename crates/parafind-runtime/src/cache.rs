//! In-process classification cache.
//!
//! Chat corpora repeat prompts often. Caching the raw classification by
//! prompt text lets duplicates skip the LLM call; the validator still runs
//! for each occurrence so stats stay per-record.

use std::time::Duration;

use moka::future::Cache;
use parafind_core::RawClassification;

use crate::config::CacheSettings;

const DEFAULT_CAPACITY: u64 = 10_000;
const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

/// Raw classifications keyed by exact prompt text.
#[derive(Clone)]
pub struct ClassificationCache {
    entries: Cache<String, RawClassification>,
}

impl ClassificationCache {
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        Self {
            entries: Cache::builder().max_capacity(capacity).time_to_live(ttl).build(),
        }
    }

    /// `None` when `cache.enabled` is off.
    pub fn from_settings(settings: &CacheSettings) -> Option<Self> {
        settings
            .enabled
            .then(|| Self::new(settings.max_entries, settings.ttl))
    }

    pub async fn get(&self, prompt: &str) -> Option<RawClassification> {
        self.entries.get(prompt).await
    }

    pub async fn insert(&self, prompt: String, raw: RawClassification) {
        self.entries.insert(prompt, raw).await;
    }
}

impl Default for ClassificationCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_TTL)
    }
}

impl std::fmt::Debug for ClassificationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassificationCache")
            .field("entries", &self.entries.entry_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hit_requires_exact_prompt() {
        let cache = ClassificationCache::default();
        let prompt = "Translate these sentences into French: hi. bye.";

        assert!(cache.get(prompt).await.is_none());

        let raw = RawClassification {
            parallelizable: Some(true),
            category: Some("Translation".to_string()),
            ..Default::default()
        };
        cache.insert(prompt.to_string(), raw.clone()).await;

        assert_eq!(cache.get(prompt).await, Some(raw));
        assert!(cache.get("Translate this sentence").await.is_none());
    }

    #[test]
    fn test_disabled_settings() {
        let settings = CacheSettings {
            enabled: false,
            ..Default::default()
        };
        assert!(ClassificationCache::from_settings(&settings).is_none());
    }
}
