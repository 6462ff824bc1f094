//! Heuristic signal battery and tier scoring.

use serde::Serialize;

use super::lexicon;
use crate::types::ValidationTier;

/// Categories accepted at medium confidence without textual evidence.
pub const MEDIUM_CONFIDENCE_CATEGORIES: &[&str] = &[
    "Reading Comprehension",
    "Named Entity Recognition",
    "Translation",
];

/// Minimum `data` length that alone justifies medium confidence.
pub const MEDIUM_CONFIDENCE_MIN_DATA: usize = 3;

/// Every signal the validator looks at for one prompt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HeuristicSignals {
    pub numeric_request: bool,
    pub list_introducer: bool,
    pub numbered_items: bool,
    pub multiple_questions: bool,
    pub bullet_list: bool,
    pub multiplicity_marker: bool,
    pub comma_list: bool,
    pub for_each: bool,
    pub plural_colon: bool,
    /// `data` is a list with more than one entry
    pub parallel_data: bool,
    /// `n` is numeric and greater than one
    pub multiple_n: bool,
    /// Number of `data` entries (0 when absent)
    pub data_len: usize,
}

impl HeuristicSignals {
    /// Evaluate all signals against the original prompt and decomposition shape.
    pub fn evaluate(prompt: &str, data: Option<&[String]>, n: Option<f64>) -> Self {
        let lower = prompt.to_lowercase();
        let data_len = data.map(|d| d.len()).unwrap_or(0);

        Self {
            numeric_request: lexicon::has_numeric_request(&lower),
            list_introducer: lexicon::has_list_introducer(&lower),
            numbered_items: lexicon::has_numbered_items(prompt),
            multiple_questions: lexicon::has_multiple_questions(prompt),
            bullet_list: lexicon::has_bullet_list(prompt),
            multiplicity_marker: lexicon::has_multiplicity_marker(&lower),
            comma_list: lexicon::has_comma_list(&lower),
            for_each: lexicon::has_for_each(&lower),
            plural_colon: lexicon::has_plural_colon(&lower),
            parallel_data: data_len > 1,
            multiple_n: n.map(|v| v > 1.0).unwrap_or(false),
            data_len,
        }
    }

    /// Strict evidence of an enumerated or counted request.
    pub fn is_high_confidence(&self) -> bool {
        self.numeric_request
            || self.list_introducer
            || self.numbered_items
            || self.bullet_list
            || self.multiple_questions
            || (self.multiplicity_marker && (self.parallel_data || self.multiple_n))
    }

    /// Permissive evidence, including category allow-listing.
    pub fn is_medium_confidence(&self, category: Option<&str>) -> bool {
        self.comma_list
            || self.for_each
            || self.plural_colon
            || category
                .map(|c| MEDIUM_CONFIDENCE_CATEGORIES.contains(&c))
                .unwrap_or(false)
            || (self.parallel_data && self.data_len >= MEDIUM_CONFIDENCE_MIN_DATA)
    }

    /// Map signals to a tier. Never returns `NotParallelizable`.
    pub fn tier(&self, category: Option<&str>) -> ValidationTier {
        if self.is_high_confidence() {
            ValidationTier::HighConfidence
        } else if self.is_medium_confidence(category) {
            ValidationTier::MediumConfidence
        } else {
            ValidationTier::LowConfidence
        }
    }

    /// Names of the textual and shape signals that matched.
    pub fn fired(&self) -> Vec<&'static str> {
        [
            ("numeric_request", self.numeric_request),
            ("list_introducer", self.list_introducer),
            ("numbered_items", self.numbered_items),
            ("multiple_questions", self.multiple_questions),
            ("bullet_list", self.bullet_list),
            ("multiplicity_marker", self.multiplicity_marker),
            ("comma_list", self.comma_list),
            ("for_each", self.for_each),
            ("plural_colon", self.plural_colon),
            ("parallel_data", self.parallel_data),
            ("multiple_n", self.multiple_n),
        ]
        .into_iter()
        .filter_map(|(name, on)| on.then_some(name))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_numeric_request_is_high() {
        let signals = HeuristicSignals::evaluate("Write 5 stories about dragons", None, Some(5.0));
        assert!(signals.numeric_request);
        assert_eq!(signals.tier(None), ValidationTier::HighConfidence);
    }

    #[test]
    fn test_multiplicity_needs_shape() {
        let prompt = "Give several synonyms for happy";
        let without = HeuristicSignals::evaluate(prompt, None, None);
        assert!(without.multiplicity_marker);
        assert!(!without.is_high_confidence());

        let with_n = HeuristicSignals::evaluate(prompt, None, Some(4.0));
        assert!(with_n.is_high_confidence());
    }

    #[test]
    fn test_comma_list_is_medium() {
        let data = strings(&["apple", "banana", "cherry"]);
        let signals = HeuristicSignals::evaluate(
            "Extract keywords from: apple, banana, and cherry.",
            Some(&data),
            None,
        );
        assert!(signals.comma_list);
        assert!(signals.tier(Some("Keyword Extraction")).is_passing());
    }

    #[test]
    fn test_allow_listed_category_is_medium() {
        let signals = HeuristicSignals::evaluate("Translate this text into German please", None, None);
        assert_eq!(signals.tier(Some("Translation")), ValidationTier::MediumConfidence);
        assert_eq!(signals.tier(Some("Poetry")), ValidationTier::LowConfidence);
    }

    #[test]
    fn test_long_data_is_medium() {
        let data = strings(&["x", "y", "z"]);
        let signals = HeuristicSignals::evaluate("Do the thing with the stuff", Some(&data), None);
        assert_eq!(signals.tier(None), ValidationTier::MediumConfidence);

        let short = strings(&["x", "y"]);
        let signals = HeuristicSignals::evaluate("Do the thing with the stuff", Some(&short), None);
        assert_eq!(signals.tier(None), ValidationTier::LowConfidence);
    }

    #[test]
    fn test_fired_lists_matches() {
        let signals = HeuristicSignals::evaluate("For each city: name 3 examples of local food", None, None);
        let fired = signals.fired();
        assert!(fired.contains(&"for_each"));
        assert!(fired.contains(&"numeric_request"));
        assert!(!fired.contains(&"bullet_list"));
    }
}
