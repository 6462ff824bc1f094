//! Core data model: raw model classifications and validated records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value as JsonValue};

/// Category whose decomposition is a repeat count `n` rather than a data list.
pub const REPEATED_GENERATION: &str = "Repeated Generation";

/// Task categories of the curated taxonomy.
///
/// Anything else the model reports is a novel category.
pub const KNOWN_CATEGORIES: &[&str] = &[
    REPEATED_GENERATION,
    "Reading Comprehension",
    "Named Entity Recognition",
    "Keyword Extraction",
    "Translation",
    "Language Correction",
    "Sentiment Analysis",
];

/// Check if a category belongs to the curated taxonomy.
pub fn is_known_category(category: &str) -> bool {
    KNOWN_CATEGORIES.contains(&category)
}

/// Confidence bucket assigned by the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationTier {
    /// Model said no, or the decomposition was structurally broken
    NotParallelizable,
    /// Model said yes but the prompt shows no evidence of decomposability
    LowConfidence,
    /// Permissive heuristics matched
    MediumConfidence,
    /// Strict heuristics matched
    HighConfidence,
}

impl ValidationTier {
    /// Whether this tier counts as a passed validation.
    pub fn is_passing(&self) -> bool {
        matches!(self, Self::MediumConfidence | Self::HighConfidence)
    }

    /// Stable snake_case name, as persisted.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotParallelizable => "not_parallelizable",
            Self::LowConfidence => "low_confidence",
            Self::MediumConfidence => "medium_confidence",
            Self::HighConfidence => "high_confidence",
        }
    }
}

impl std::fmt::Display for ValidationTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The object a classifier model reports for one prompt, before validation.
///
/// `data`, `n` and `context` stay as raw JSON so that malformed shapes reach
/// the schema gate instead of failing deserialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawClassification {
    #[serde(default)]
    pub parallelizable: Option<bool>,

    #[serde(default)]
    pub category: Option<String>,

    #[serde(default)]
    pub is_novel_category: Option<bool>,

    #[serde(default)]
    pub category_description: Option<String>,

    #[serde(default)]
    pub serial: Option<String>,

    #[serde(default)]
    pub template: Option<String>,

    #[serde(default)]
    pub context: Option<JsonValue>,

    #[serde(default)]
    pub data: Option<JsonValue>,

    #[serde(default)]
    pub n: Option<JsonValue>,
}

impl RawClassification {
    /// The fixed "not parallelizable" object used when nothing usable came back.
    pub fn fallback(prompt: &str) -> Self {
        Self {
            parallelizable: Some(false),
            is_novel_category: Some(false),
            serial: Some(prompt.to_string()),
            ..Default::default()
        }
    }

    /// Whether the model claimed the prompt is parallelizable.
    pub fn is_parallelizable(&self) -> bool {
        self.parallelizable.unwrap_or(false)
    }

    /// Whether the model flagged its category as novel.
    pub fn is_novel(&self) -> bool {
        self.is_novel_category.unwrap_or(false)
    }

    /// `data` with JSON null treated as absent.
    pub fn data_value(&self) -> Option<&JsonValue> {
        self.data.as_ref().filter(|v| !v.is_null())
    }

    /// `n` with JSON null treated as absent.
    pub fn n_value(&self) -> Option<&JsonValue> {
        self.n.as_ref().filter(|v| !v.is_null())
    }

    /// `data` as a list of strings, if it has that shape.
    pub fn data_items(&self) -> Option<Vec<String>> {
        let items = self.data_value()?.as_array()?;
        items
            .iter()
            .map(|item| item.as_str().map(str::to_string))
            .collect()
    }

    /// `n` as a JSON number, if it is one.
    pub fn n_number(&self) -> Option<Number> {
        match self.n_value()? {
            JsonValue::Number(n) => Some(n.clone()),
            _ => None,
        }
    }

    /// `context` rendered as text. Non-string values keep their JSON text.
    pub fn context_text(&self) -> Option<String> {
        match self.context.as_ref()? {
            JsonValue::Null => None,
            JsonValue::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// Processing-time metadata attached to every record.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordMeta {
    pub index: u64,
    pub query_id: String,
    pub prompt: String,
    pub timestamp: DateTime<Utc>,
}

impl RecordMeta {
    /// Metadata stamped with the current time.
    pub fn new(index: u64, query_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            index,
            query_id: query_id.into(),
            prompt: prompt.into(),
            timestamp: Utc::now(),
        }
    }
}

/// One processed prompt after validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Position in the source corpus
    pub index: u64,

    /// Short random identifier
    pub query_id: String,

    /// Original prompt text
    pub prompt: String,

    /// Final verdict (may be downgraded by the validator, never upgraded)
    pub parallelizable: bool,

    pub category: Option<String>,

    #[serde(default)]
    pub is_novel_category: bool,

    pub category_description: Option<String>,

    /// Single-execution form of the prompt
    pub serial: String,

    pub template: Option<String>,

    pub context: Option<String>,

    pub data: Option<Vec<String>>,

    pub n: Option<Number>,

    pub validation_tier: ValidationTier,

    /// Derived from `validation_tier`
    pub validation_passed: bool,

    pub timestamp: DateTime<Utc>,
}

impl ClassificationResult {
    /// Record substituted when classification itself failed.
    pub fn fallback(meta: RecordMeta) -> Self {
        Self {
            index: meta.index,
            query_id: meta.query_id,
            serial: meta.prompt.clone(),
            prompt: meta.prompt,
            parallelizable: false,
            category: None,
            is_novel_category: false,
            category_description: None,
            template: None,
            context: None,
            data: None,
            n: None,
            validation_tier: ValidationTier::NotParallelizable,
            validation_passed: false,
            timestamp: meta.timestamp,
        }
    }

    /// Reset the verdict and every decomposition field.
    pub fn downgrade(&mut self, tier: ValidationTier) {
        self.parallelizable = false;
        self.category = None;
        self.is_novel_category = false;
        self.category_description = None;
        self.template = None;
        self.context = None;
        self.data = None;
        self.n = None;
        self.validation_tier = tier;
        self.validation_passed = tier.is_passing();
    }

    /// Whether this record introduces a category outside the taxonomy.
    pub fn novel_category(&self) -> Option<&str> {
        if self.parallelizable && self.is_novel_category {
            self.category.as_deref().filter(|c| !c.is_empty())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tier_serialization() {
        let json = serde_json::to_string(&ValidationTier::MediumConfidence).unwrap();
        assert_eq!(json, "\"medium_confidence\"");
        assert!(ValidationTier::HighConfidence.is_passing());
        assert!(!ValidationTier::LowConfidence.is_passing());
        assert!(!ValidationTier::NotParallelizable.is_passing());
    }

    #[test]
    fn test_raw_accessors() {
        let raw: RawClassification = serde_json::from_value(json!({
            "parallelizable": true,
            "data": ["a", "b"],
            "n": null,
            "context": {"lang": "en"}
        }))
        .unwrap();

        assert!(raw.is_parallelizable());
        assert!(!raw.is_novel());
        assert_eq!(raw.data_items(), Some(vec!["a".to_string(), "b".to_string()]));
        assert!(raw.n_value().is_none());
        assert_eq!(raw.context_text().as_deref(), Some(r#"{"lang":"en"}"#));
    }

    #[test]
    fn test_data_items_rejects_mixed_types() {
        let raw = RawClassification {
            data: Some(json!(["a", 2])),
            ..Default::default()
        };
        assert!(raw.data_items().is_none());
    }

    #[test]
    fn test_fallback_record() {
        let meta = RecordMeta::new(7, "abcd1234", "Write a haiku about rain");
        let record = ClassificationResult::fallback(meta);

        assert!(!record.parallelizable);
        assert_eq!(record.serial, "Write a haiku about rain");
        assert_eq!(record.validation_tier, ValidationTier::NotParallelizable);
        assert!(!record.validation_passed);
    }

    #[test]
    fn test_known_categories() {
        assert!(is_known_category("Translation"));
        assert!(!is_known_category("Recipe Scaling"));
    }
}
