//! # parafind-core
//!
//! Deterministic extraction and validation of parallelizable-prompt
//! classifications.
//!
//! A language model decides whether a prompt can be split into independent
//! sub-tasks. This crate decides how much to believe it:
//! - Is the model's answer a well-formed classification object?
//! - Is the claimed decomposition structurally sound?
//! - Does the prompt text itself show evidence of decomposability?
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: Same response and prompt always produce the same record
//! 2. **No LLM calls, no I/O**: All validation is rule-based
//! 3. **Downgrade-only**: A negative claim is never turned positive
//! 4. **Never fails**: Malformed model output degrades to a fallback record
//!
//! ## Example
//!
//! ```rust,ignore
//! use parafind_core::{RecordMeta, ResponseExtractor, ValidationStats, Validator};
//!
//! let prompt = "Translate these sentences into French: ...";
//! let raw = ResponseExtractor::new().extract(&model_text, prompt);
//!
//! let mut stats = ValidationStats::new();
//! let record = Validator::new().validate_into(&raw, RecordMeta::new(0, "1a2b3c4d", prompt), &mut stats);
//!
//! println!("{} -> {}", record.query_id, record.validation_tier);
//! ```

pub mod extractor;
pub mod heuristics;
pub mod registry;
pub mod schema;
pub mod stats;
pub mod types;
pub mod validator;

// Re-export main types at crate root
pub use extractor::{BraceSpan, ExtractionStrategy, FencedJsonBlock, ResponseExtractor, WholeDocument};
pub use heuristics::HeuristicSignals;
pub use registry::{NovelCategory, NovelCategoryRegistry, NovelExample};
pub use schema::{check_decomposition, validate_response_shape, SchemaError, SchemaViolation};
pub use stats::{StatsOutcome, ValidationStats, UNKNOWN_CATEGORY};
pub use types::{
    is_known_category, ClassificationResult, RawClassification, RecordMeta, ValidationTier,
    KNOWN_CATEGORIES, REPEATED_GENERATION,
};
pub use validator::{Validation, Validator};

/// Extract and validate a model response in one call.
///
/// Convenience entry point for offline checks; the batch runner calls the
/// extractor and validator separately so it can cache raw classifications.
pub fn classify_response(
    response: &str,
    meta: RecordMeta,
    stats: &mut ValidationStats,
) -> ClassificationResult {
    let raw = ResponseExtractor::new().extract(response, &meta.prompt);
    Validator::new().validate_into(&raw, meta, stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_to_end_pass() {
        let response = r#"Here you go:
```json
{
  "parallelizable": true,
  "category": "Sentiment Analysis",
  "is_novel_category": false,
  "serial": "Classify the sentiment of a review",
  "template": "Classify the sentiment of this review: {data}",
  "context": null,
  "data": ["Great product", "Terrible service", "It was fine"],
  "n": null
}
```"#;
        let prompt = "Classify the sentiment of each review:\n- Great product\n- Terrible service\n- It was fine";
        let mut stats = ValidationStats::new();

        let record = classify_response(response, RecordMeta::new(3, "abcd0123", prompt), &mut stats);

        assert!(record.parallelizable);
        assert_eq!(record.validation_tier, ValidationTier::HighConfidence);
        assert_eq!(stats.passed_validation, 1);
    }

    #[test]
    fn test_end_to_end_garbage() {
        let mut stats = ValidationStats::new();
        let record = classify_response(
            "Sorry, I can't do that.",
            RecordMeta::new(0, "00000000", "Write 10 stories"),
            &mut stats,
        );

        assert!(!record.parallelizable);
        assert_eq!(record.validation_tier, ValidationTier::NotParallelizable);
        assert_eq!(record.serial, "Write 10 stories");
        assert_eq!(stats.total_classified_as_parallelizable, 0);
    }
}
