//! Structured-response extraction from raw model text.
//!
//! Models often wrap their JSON in prose or markdown fences. The extractor
//! runs an ordered chain of strategies; the first one yielding an object
//! that matches the classification shape wins. If none does, the fixed
//! "not parallelizable" fallback is returned. Extraction never fails.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::schema::validate_response_shape;
use crate::types::RawClassification;

lazy_static! {
    /// Contents of a ```json fenced block.
    static ref FENCED_JSON_PATTERN: Regex = Regex::new(r"(?s)```json\s*(.*?)\s*```").unwrap();
}

/// One way of locating a JSON document inside model text.
pub trait ExtractionStrategy: Send + Sync {
    /// Short name for logging.
    fn name(&self) -> &'static str;

    /// The candidate JSON text, if this strategy finds one.
    fn candidate<'a>(&self, text: &'a str) -> Option<&'a str>;
}

/// The whole response is the document.
#[derive(Debug, Clone, Copy, Default)]
pub struct WholeDocument;

impl ExtractionStrategy for WholeDocument {
    fn name(&self) -> &'static str {
        "whole_document"
    }

    fn candidate<'a>(&self, text: &'a str) -> Option<&'a str> {
        let trimmed = text.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }
}

/// A ```json fenced code block.
#[derive(Debug, Clone, Copy, Default)]
pub struct FencedJsonBlock;

impl ExtractionStrategy for FencedJsonBlock {
    fn name(&self) -> &'static str {
        "fenced_json_block"
    }

    fn candidate<'a>(&self, text: &'a str) -> Option<&'a str> {
        FENCED_JSON_PATTERN
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }
}

/// Everything from the first `{` to the last `}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BraceSpan;

impl ExtractionStrategy for BraceSpan {
    fn name(&self) -> &'static str {
        "brace_span"
    }

    fn candidate<'a>(&self, text: &'a str) -> Option<&'a str> {
        let start = text.find('{')?;
        let end = text.rfind('}')?;
        (start < end).then(|| &text[start..=end])
    }
}

/// Ordered strategy chain over model responses.
pub struct ResponseExtractor {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl Default for ResponseExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseExtractor {
    /// Whole document, then fenced block, then brace span.
    pub fn new() -> Self {
        Self::with_strategies(vec![
            Box::new(WholeDocument),
            Box::new(FencedJsonBlock),
            Box::new(BraceSpan),
        ])
    }

    pub fn with_strategies(strategies: Vec<Box<dyn ExtractionStrategy>>) -> Self {
        Self { strategies }
    }

    /// Extract a classification, falling back when every strategy fails.
    pub fn extract(&self, text: &str, prompt: &str) -> RawClassification {
        match self.try_extract(text) {
            Some(raw) => raw,
            None => {
                warn!(
                    response_chars = text.len(),
                    "No classification object found in model response, using fallback"
                );
                RawClassification::fallback(prompt)
            }
        }
    }

    /// Run the chain without a fallback.
    pub fn try_extract(&self, text: &str) -> Option<RawClassification> {
        self.strategies.iter().find_map(|strategy| {
            let candidate = strategy.candidate(text)?;
            match parse_classification(candidate) {
                Ok(raw) => {
                    debug!(strategy = strategy.name(), "Extracted classification");
                    Some(raw)
                }
                Err(reason) => {
                    debug!(strategy = strategy.name(), reason = %reason, "Extraction strategy failed");
                    None
                }
            }
        })
    }
}

fn parse_classification(candidate: &str) -> Result<RawClassification, String> {
    let value: JsonValue = serde_json::from_str(candidate).map_err(|e| e.to_string())?;
    validate_response_shape(&value).map_err(|errors| errors.join("; "))?;
    serde_json::from_value(value).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROMPT: &str = "Translate these sentences into French";

    #[test]
    fn test_plain_json() {
        let text = r#"{"parallelizable": true, "category": "Translation", "data": ["a", "b"]}"#;
        let raw = ResponseExtractor::new().extract(text, PROMPT);
        assert_eq!(raw.parallelizable, Some(true));
        assert_eq!(raw.category.as_deref(), Some("Translation"));
    }

    #[test]
    fn test_fenced_block_in_prose() {
        let text = "Sure! Here is my analysis:\n```json\n{\"parallelizable\": true, \"category\": \"Translation\"}\n```\nLet me know {if} you need more.";
        let raw = ResponseExtractor::new().extract(text, PROMPT);
        assert_eq!(raw.parallelizable, Some(true));
        assert_eq!(raw.category.as_deref(), Some("Translation"));
    }

    #[test]
    fn test_brace_span() {
        let text = "Result: {\"parallelizable\": false, \"serial\": \"Say hi\"} (end)";
        let raw = ResponseExtractor::new().extract(text, PROMPT);
        assert_eq!(raw.parallelizable, Some(false));
        assert_eq!(raw.serial.as_deref(), Some("Say hi"));
    }

    #[test]
    fn test_garbage_falls_back() {
        let raw = ResponseExtractor::new().extract("I cannot help with that.", PROMPT);
        assert_eq!(raw, RawClassification::fallback(PROMPT));
        assert_eq!(raw.serial.as_deref(), Some(PROMPT));
    }

    #[test]
    fn test_wrong_shape_falls_back() {
        let raw = ResponseExtractor::new().extract(r#"{"parallelizable": "maybe"}"#, PROMPT);
        assert_eq!(raw, RawClassification::fallback(PROMPT));

        let raw = ResponseExtractor::new().extract("[1, 2, 3]", PROMPT);
        assert_eq!(raw, RawClassification::fallback(PROMPT));
    }

    #[test]
    fn test_custom_chain() {
        let extractor = ResponseExtractor::with_strategies(vec![Box::new(FencedJsonBlock)]);
        assert!(extractor.try_extract(r#"{"parallelizable": true}"#).is_none());
        assert!(extractor
            .try_extract("```json\n{\"parallelizable\": true}\n```")
            .is_some());
    }
}
