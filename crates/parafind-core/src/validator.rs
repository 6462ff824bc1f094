//! Validator: turns a model's self-reported classification into a tiered verdict.
//!
//! The validator applies fixed rules in order, first terminal rule wins:
//! 1. Model says not parallelizable → accepted as is, no counters move
//! 2. Decomposition violates the schema → downgraded to `not_parallelizable`
//! 3. Heuristics find no evidence → downgraded to `low_confidence`
//! 4. Otherwise → `medium_confidence` or `high_confidence`, fields kept
//!
//! The validator can only ever turn a positive claim negative.

use tracing::{debug, warn};

use crate::heuristics::HeuristicSignals;
use crate::schema::{check_decomposition, SchemaViolation};
use crate::stats::{StatsOutcome, ValidationStats};
use crate::types::{ClassificationResult, RawClassification, RecordMeta, ValidationTier};

/// Outcome of validating one raw classification.
#[derive(Debug, Clone)]
pub struct Validation {
    /// The final record
    pub result: ClassificationResult,

    /// Contribution to the run counters
    pub outcome: StatsOutcome,

    /// Decomposition problems found by the schema gate
    pub violations: Vec<SchemaViolation>,

    /// Heuristic signals, when the heuristic stage ran
    pub signals: Option<HeuristicSignals>,
}

/// Deterministic multi-tier validator.
#[derive(Debug, Clone, Copy, Default)]
pub struct Validator;

impl Validator {
    pub fn new() -> Self {
        Self
    }

    /// Validate a raw classification for the prompt in `meta`.
    pub fn validate(&self, raw: &RawClassification, meta: RecordMeta) -> Validation {
        let mut result = Self::build_record(raw, meta);

        // Rule 1: negative claims are trusted
        if !raw.is_parallelizable() {
            result.downgrade(ValidationTier::NotParallelizable);
            return Validation {
                result,
                outcome: StatsOutcome::Skipped,
                violations: Vec::new(),
                signals: None,
            };
        }

        let category = raw.category.as_deref();

        // Rule 2: schema integrity gate
        let violations = check_decomposition(raw);
        if !violations.is_empty() {
            for violation in &violations {
                warn!(
                    index = result.index,
                    category = category.unwrap_or_default(),
                    violation = %violation,
                    "Schema validation failed"
                );
            }
            result.downgrade(ValidationTier::NotParallelizable);
            return Validation {
                result,
                outcome: StatsOutcome::failed(category),
                violations,
                signals: None,
            };
        }

        // Rule 3: heuristic confidence
        let data = raw.data_items();
        let n = raw.n_number().and_then(|n| n.as_f64());
        let signals = HeuristicSignals::evaluate(&result.prompt, data.as_deref(), n);
        let tier = signals.tier(category);

        debug!(
            index = result.index,
            tier = %tier,
            signals = ?signals.fired(),
            "Heuristic signals evaluated"
        );

        let outcome = if tier.is_passing() {
            result.validation_tier = tier;
            result.validation_passed = true;
            StatsOutcome::passed(category)
        } else {
            warn!(
                index = result.index,
                category = category.unwrap_or_default(),
                "No decomposability evidence in prompt, rejecting"
            );
            result.downgrade(tier);
            StatsOutcome::failed(category)
        };

        Validation {
            result,
            outcome,
            violations,
            signals: Some(signals),
        }
    }

    /// Validate and apply the outcome to `stats` in one step.
    pub fn validate_into(
        &self,
        raw: &RawClassification,
        meta: RecordMeta,
        stats: &mut ValidationStats,
    ) -> ClassificationResult {
        let validation = self.validate(raw, meta);
        stats.record(&validation.outcome);
        validation.result
    }

    /// Copy the model's fields into a record, before any verdict is applied.
    fn build_record(raw: &RawClassification, meta: RecordMeta) -> ClassificationResult {
        let serial = raw
            .serial
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| meta.prompt.clone());

        ClassificationResult {
            index: meta.index,
            query_id: meta.query_id,
            prompt: meta.prompt,
            parallelizable: raw.is_parallelizable(),
            category: raw.category.clone(),
            is_novel_category: raw.is_novel(),
            category_description: raw.category_description.clone(),
            serial,
            template: raw.template.clone(),
            context: raw.context_text(),
            data: raw.data_items(),
            n: raw.n_number(),
            validation_tier: ValidationTier::NotParallelizable,
            validation_passed: false,
            timestamp: meta.timestamp,
        }
    }
}
