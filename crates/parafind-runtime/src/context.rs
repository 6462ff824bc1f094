//! Process-wide state of one run.
//!
//! The run context owns the three stores and the in-memory copies of
//! validation stats and the novel-category registry. Workers share it
//! through an `Arc`; each piece of mutable state has its own lock.

use std::path::Path;

use parafind_core::{
    ClassificationResult, NovelCategoryRegistry, RawClassification, RecordMeta, ValidationStats,
    Validator,
};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::store::{JsonFileStore, ResultStore, StoreError, StorePaths};

#[derive(Debug)]
pub struct RunContext {
    prefix: String,
    paths: StorePaths,
    rows: ResultStore,
    stats_file: JsonFileStore<ValidationStats>,
    novel_file: JsonFileStore<NovelCategoryRegistry>,
    stats: Mutex<ValidationStats>,
    novel: Mutex<NovelCategoryRegistry>,
    validator: Validator,
}

impl RunContext {
    /// Open or create the stores for `prefix` under `dir` and load prior state.
    pub fn init(dir: impl AsRef<Path>, prefix: &str) -> Result<Self, StoreError> {
        let paths = StorePaths::for_prefix(dir, prefix);

        let rows = ResultStore::open(&paths.rows)?;
        let stats_file = JsonFileStore::new(&paths.stats);
        let novel_file = JsonFileStore::new(&paths.novel_categories);

        let stats: ValidationStats = stats_file.load_or_default();
        let novel: NovelCategoryRegistry = novel_file.load_or_default();
        novel_file.ensure_exists()?;

        info!(
            prefix,
            parallelizable_so_far = stats.total_classified_as_parallelizable,
            novel_categories = novel.len(),
            "Run context initialized"
        );

        Ok(Self {
            prefix: prefix.to_string(),
            paths,
            rows,
            stats_file,
            novel_file,
            stats: Mutex::new(stats),
            novel: Mutex::new(novel),
            validator: Validator::new(),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    /// Validate a raw classification and count the outcome.
    pub fn validate(&self, raw: &RawClassification, meta: RecordMeta) -> ClassificationResult {
        let validation = self.validator.validate(raw, meta);
        self.stats.lock().record(&validation.outcome);
        validation.result
    }

    /// Append the record to the row store if it is parallelizable.
    pub fn persist(&self, result: &ClassificationResult) -> Result<bool, StoreError> {
        self.rows.append(result)
    }

    /// Track a novel category and persist the registry when it changed.
    ///
    /// Returns `Some(true)` when the category was seen for the first time.
    pub fn record_novel(&self, result: &ClassificationResult) -> Result<Option<bool>, StoreError> {
        let mut novel = self.novel.lock();
        let Some(discovered) = novel.record(result) else {
            return Ok(None);
        };

        self.novel_file.save(&novel)?;

        if discovered {
            info!(
                index = result.index,
                category = result.category.as_deref().unwrap_or_default(),
                description = result.category_description.as_deref().unwrap_or_default(),
                "New category discovered"
            );
        }
        Ok(Some(discovered))
    }

    /// Write validation stats and the novel-category registry.
    pub fn flush(&self) -> Result<(), StoreError> {
        let stats = self.stats_snapshot();
        self.stats_file.save(&stats)?;

        let novel = self.novel_snapshot();
        self.novel_file.save(&novel)?;

        debug!(prefix = %self.prefix, "State flushed");
        Ok(())
    }

    /// First corpus index not yet covered by the row store.
    pub fn resume_position(&self) -> Result<u64, StoreError> {
        Ok(self.rows.max_index()?.map_or(0, |index| index + 1))
    }

    pub fn stats_snapshot(&self) -> ValidationStats {
        self.stats.lock().clone()
    }

    pub fn novel_snapshot(&self) -> NovelCategoryRegistry {
        self.novel.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn novel_raw() -> RawClassification {
        serde_json::from_value(json!({
            "parallelizable": true,
            "category": "Recipe Scaling",
            "is_novel_category": true,
            "category_description": "Scale several recipes",
            "template": "Scale this recipe for 8 people: {data}",
            "data": ["pancakes", "lasagna", "chili"]
        }))
        .unwrap()
    }

    #[test]
    fn test_init_creates_novel_file() {
        let dir = tempdir().unwrap();
        let ctx = RunContext::init(dir.path(), "lmsys").unwrap();

        assert!(ctx.paths().novel_categories.exists());
        assert!(ctx.paths().rows.exists());
        assert_eq!(ctx.resume_position().unwrap(), 0);
    }

    #[test]
    fn test_validate_persist_and_flush() {
        let dir = tempdir().unwrap();
        let prompt = "Scale each recipe for 8 people:\n1. pancakes\n2. lasagna\n3. chili";

        {
            let ctx = RunContext::init(dir.path(), "trial").unwrap();
            let result = ctx.validate(&novel_raw(), RecordMeta::new(41, "feedface", prompt));
            assert!(result.parallelizable);

            assert!(ctx.persist(&result).unwrap());
            assert_eq!(ctx.record_novel(&result).unwrap(), Some(true));
            assert_eq!(ctx.record_novel(&result).unwrap(), Some(false));
            ctx.flush().unwrap();
        }

        let ctx = RunContext::init(dir.path(), "trial").unwrap();
        assert_eq!(ctx.resume_position().unwrap(), 42);
        assert_eq!(ctx.stats_snapshot().passed_validation, 1);
        assert_eq!(
            ctx.novel_snapshot().get("Recipe Scaling").map(|c| c.count),
            Some(2)
        );
    }

    #[test]
    fn test_rejected_is_not_novel() {
        let dir = tempdir().unwrap();
        let ctx = RunContext::init(dir.path(), "trial").unwrap();

        let result = ctx.validate(
            &RawClassification::fallback("Tell me a joke please"),
            RecordMeta::new(0, "00000000", "Tell me a joke please"),
        );

        assert!(!ctx.persist(&result).unwrap());
        assert_eq!(ctx.record_novel(&result).unwrap(), None);
        assert_eq!(ctx.stats_snapshot(), ValidationStats::default());
    }
}
