//! Aggregate validation counters for a run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Category key used when the model reported no category.
pub const UNKNOWN_CATEGORY: &str = "Unknown";

/// What a single validation contributes to the run counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatsOutcome {
    /// Model said not parallelizable; no counter moves
    Skipped,
    /// Claim survived validation
    Passed { category: String },
    /// Claim was downgraded by the schema gate or the heuristics
    Failed { category: String },
}

impl StatsOutcome {
    /// Build a passed outcome, mapping a missing category to `Unknown`.
    pub fn passed(category: Option<&str>) -> Self {
        Self::Passed {
            category: category_key(category),
        }
    }

    /// Build a failed outcome, mapping a missing category to `Unknown`.
    pub fn failed(category: Option<&str>) -> Self {
        Self::Failed {
            category: category_key(category),
        }
    }
}

fn category_key(category: Option<&str>) -> String {
    category.unwrap_or(UNKNOWN_CATEGORY).to_string()
}

/// Running validation counters, persisted between runs.
///
/// Field names are the on-disk keys. Missing fields load as zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationStats {
    pub total_classified_as_parallelizable: u64,
    pub failed_validation: u64,
    pub passed_validation: u64,
    pub categories_failed: BTreeMap<String, u64>,
    pub categories_passed: BTreeMap<String, u64>,
}

impl ValidationStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one validation outcome.
    pub fn record(&mut self, outcome: &StatsOutcome) {
        match outcome {
            StatsOutcome::Skipped => {}
            StatsOutcome::Passed { category } => {
                self.total_classified_as_parallelizable += 1;
                self.passed_validation += 1;
                *self.categories_passed.entry(category.clone()).or_insert(0) += 1;
            }
            StatsOutcome::Failed { category } => {
                self.total_classified_as_parallelizable += 1;
                self.failed_validation += 1;
                *self.categories_failed.entry(category.clone()).or_insert(0) += 1;
            }
        }
    }

    /// Share of parallelizable claims that passed, in `[0, 1]`.
    pub fn pass_rate(&self) -> f64 {
        if self.total_classified_as_parallelizable == 0 {
            return 0.0;
        }
        self.passed_validation as f64 / self.total_classified_as_parallelizable as f64
    }

    /// Share of parallelizable claims that were downgraded, in `[0, 1]`.
    pub fn fail_rate(&self) -> f64 {
        if self.total_classified_as_parallelizable == 0 {
            return 0.0;
        }
        self.failed_validation as f64 / self.total_classified_as_parallelizable as f64
    }

    /// Whether passed and failed add up to the claimed total.
    pub fn is_balanced(&self) -> bool {
        self.passed_validation + self.failed_validation == self.total_classified_as_parallelizable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skipped_changes_nothing() {
        let mut stats = ValidationStats::new();
        stats.record(&StatsOutcome::Skipped);
        assert_eq!(stats, ValidationStats::default());
    }

    #[test]
    fn test_record_pass_and_fail() {
        let mut stats = ValidationStats::new();
        stats.record(&StatsOutcome::passed(Some("Translation")));
        stats.record(&StatsOutcome::passed(Some("Translation")));
        stats.record(&StatsOutcome::failed(None));

        assert_eq!(stats.total_classified_as_parallelizable, 3);
        assert_eq!(stats.passed_validation, 2);
        assert_eq!(stats.failed_validation, 1);
        assert_eq!(stats.categories_passed.get("Translation"), Some(&2));
        assert_eq!(stats.categories_failed.get(UNKNOWN_CATEGORY), Some(&1));
        assert!(stats.is_balanced());
        assert!((stats.pass_rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_rates_on_empty() {
        let stats = ValidationStats::new();
        assert_eq!(stats.pass_rate(), 0.0);
        assert_eq!(stats.fail_rate(), 0.0);
    }

    #[test]
    fn test_missing_fields_default() {
        let stats: ValidationStats =
            serde_json::from_str(r#"{"passed_validation": 4, "total_classified_as_parallelizable": 4}"#)
                .unwrap();
        assert_eq!(stats.passed_validation, 4);
        assert_eq!(stats.failed_validation, 0);
        assert!(stats.categories_failed.is_empty());
    }

    #[test]
    fn test_persisted_keys() {
        let mut stats = ValidationStats::new();
        stats.record(&StatsOutcome::passed(Some("Sentiment Analysis")));
        let value = serde_json::to_value(&stats).unwrap();

        assert_eq!(value["total_classified_as_parallelizable"], 1);
        assert_eq!(value["categories_passed"]["Sentiment Analysis"], 1);
        assert_eq!(value["failed_validation"], 0);
    }
}
