//! Schema checks for classifier output.
//!
//! Two layers:
//! - Response shape: the parsed object is validated against
//!   `schemas/classification.schema.json` before it is trusted at all.
//! - Decomposition integrity: `data`/`n`/`template` must be mutually
//!   consistent before any heuristic runs.

use std::sync::OnceLock;

use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::types::{RawClassification, REPEATED_GENERATION};

const CLASSIFICATION_SCHEMA_JSON: &str =
    include_str!("../../../schemas/classification.schema.json");

/// Compiled on first use. A broken embedded schema is kept as its message
/// so every later call reports the same failure.
static RESPONSE_SHAPE: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

/// Placeholder for the per-item data slot in a template.
pub const DATA_PLACEHOLDER: &str = "{data}";

/// Placeholder for shared context in a template.
pub const CONTEXT_PLACEHOLDER: &str = "{context}";

/// Placeholder that must never appear in a Repeated Generation template.
pub const N_PLACEHOLDER: &str = "{n}";

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("embedded classification schema unusable: {0}")]
    LoadError(String),
}

fn shape_validator() -> Result<&'static jsonschema::Validator, SchemaError> {
    RESPONSE_SHAPE
        .get_or_init(|| {
            let schema: JsonValue = serde_json::from_str(CLASSIFICATION_SCHEMA_JSON)
                .map_err(|e| format!("not JSON: {}", e))?;
            jsonschema::options()
                .build(&schema)
                .map_err(|e| format!("does not compile: {}", e))
        })
        .as_ref()
        .map_err(|e| SchemaError::LoadError(e.clone()))
}

/// Check a parsed response against the classification shape, returning
/// every violation found.
pub fn validate_response_shape(value: &JsonValue) -> Result<(), Vec<String>> {
    let validator = shape_validator().map_err(|e| vec![e.to_string()])?;

    let problems: Vec<String> = validator
        .iter_errors(value)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if problems.is_empty() {
        Ok(())
    } else {
        Err(problems)
    }
}

/// A structural problem with a claimed decomposition.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaViolation {
    #[error("both 'data' and 'n' fields populated")]
    DataAndN,

    #[error("'data' is not a list")]
    DataNotList,

    #[error("'data' list contains fewer than 2 items ({0})")]
    DataTooShort(usize),

    #[error("'data' contains non-string items")]
    DataNotStrings,

    #[error("'n' is not a valid number > 1")]
    InvalidN,

    #[error("Repeated Generation template contains '{{n}}'")]
    RepeatedTemplateHasN,

    #[error("template missing '{{data}}' and '{{context}}' placeholders")]
    TemplateMissingPlaceholders,

    #[error("Repeated Generation populated 'data' instead of 'n'")]
    RepeatedWithData,
}

/// Collect every decomposition violation in a raw classification.
///
/// An empty result means the decomposition is structurally sound.
pub fn check_decomposition(raw: &RawClassification) -> Vec<SchemaViolation> {
    let mut violations = Vec::new();
    let data = raw.data_value();
    let n = raw.n_value();
    let repeated = raw.category.as_deref() == Some(REPEATED_GENERATION);

    if data.is_some() && n.is_some() {
        violations.push(SchemaViolation::DataAndN);
    }

    if let Some(data) = data {
        match data.as_array() {
            None => violations.push(SchemaViolation::DataNotList),
            Some(items) if items.len() < 2 => {
                violations.push(SchemaViolation::DataTooShort(items.len()))
            }
            Some(items) if items.iter().any(|item| !item.is_string()) => {
                violations.push(SchemaViolation::DataNotStrings)
            }
            Some(_) => {}
        }

        if repeated {
            violations.push(SchemaViolation::RepeatedWithData);
        }
    }

    if let Some(n) = n {
        let valid = n.as_f64().map(|v| v >= 2.0).unwrap_or(false);
        if !valid {
            violations.push(SchemaViolation::InvalidN);
        }
    }

    if let Some(template) = raw.template.as_deref() {
        if repeated {
            if template.contains(N_PLACEHOLDER) {
                violations.push(SchemaViolation::RepeatedTemplateHasN);
            }
        } else if !template.contains(DATA_PLACEHOLDER) && !template.contains(CONTEXT_PLACEHOLDER) {
            violations.push(SchemaViolation::TemplateMissingPlaceholders);
        }
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: JsonValue) -> RawClassification {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_valid_shape_passes() {
        let value = json!({
            "parallelizable": true,
            "category": "Translation",
            "is_novel_category": false,
            "serial": "Translate these sentences",
            "data": ["one", "two"],
            "n": null
        });
        assert!(validate_response_shape(&value).is_ok());
    }

    #[test]
    fn test_non_object_fails_shape() {
        assert!(validate_response_shape(&json!(["not", "an", "object"])).is_err());
        assert!(validate_response_shape(&json!("text")).is_err());
    }

    #[test]
    fn test_wrong_field_type_fails_shape() {
        let value = json!({ "parallelizable": "yes" });
        let errors = validate_response_shape(&value).unwrap_err();
        assert!(!errors.is_empty());
    }

    #[test]
    fn test_valid_data_decomposition() {
        let raw = raw(json!({
            "parallelizable": true,
            "category": "Keyword Extraction",
            "template": "Extract keywords from {data}",
            "data": ["a", "b", "c"]
        }));
        assert!(check_decomposition(&raw).is_empty());
    }

    #[test]
    fn test_data_and_n_exclusive() {
        let raw = raw(json!({
            "parallelizable": true,
            "category": "Translation",
            "data": ["a", "b"],
            "n": 3
        }));
        assert!(check_decomposition(&raw).contains(&SchemaViolation::DataAndN));
    }

    #[test]
    fn test_data_shape_violations() {
        let short = raw(json!({ "data": ["a"] }));
        assert_eq!(check_decomposition(&short), vec![SchemaViolation::DataTooShort(1)]);

        let not_list = raw(json!({ "data": "a, b" }));
        assert_eq!(check_decomposition(&not_list), vec![SchemaViolation::DataNotList]);

        let mixed = raw(json!({ "data": ["a", 1] }));
        assert_eq!(check_decomposition(&mixed), vec![SchemaViolation::DataNotStrings]);
    }

    #[test]
    fn test_n_violations() {
        assert_eq!(
            check_decomposition(&raw(json!({ "n": 1 }))),
            vec![SchemaViolation::InvalidN]
        );
        assert_eq!(
            check_decomposition(&raw(json!({ "n": "5" }))),
            vec![SchemaViolation::InvalidN]
        );
        assert!(check_decomposition(&raw(json!({ "n": 2.5 }))).is_empty());
    }

    #[test]
    fn test_repeated_generation_template() {
        let with_n = raw(json!({
            "category": "Repeated Generation",
            "template": "Write a story. Repeat {n} times.",
            "n": 5
        }));
        assert_eq!(
            check_decomposition(&with_n),
            vec![SchemaViolation::RepeatedTemplateHasN]
        );

        let clean = raw(json!({
            "category": "Repeated Generation",
            "template": "Write a story.",
            "n": 5
        }));
        assert!(check_decomposition(&clean).is_empty());
    }

    #[test]
    fn test_repeated_generation_rejects_data() {
        let raw = raw(json!({
            "category": "Repeated Generation",
            "data": ["a", "b"]
        }));
        assert_eq!(
            check_decomposition(&raw),
            vec![SchemaViolation::RepeatedWithData]
        );
    }

    #[test]
    fn test_template_requires_placeholder() {
        let raw = raw(json!({
            "category": "Translation",
            "template": "Translate this sentence",
            "data": ["a", "b"]
        }));
        assert_eq!(
            check_decomposition(&raw),
            vec![SchemaViolation::TemplateMissingPlaceholders]
        );
    }

    #[test]
    fn test_null_fields_are_absent() {
        let raw = raw(json!({ "data": null, "n": null, "template": null }));
        assert!(check_decomposition(&raw).is_empty());
    }
}
