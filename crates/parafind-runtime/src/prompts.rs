//! System instruction for the classifier model.
//!
//! The instruction is static for a whole run and is sent as a cacheable
//! system block; only the user turn changes per prompt.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::config::ConfigError;

/// Built-in instruction used when no file is configured.
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = r#"
You analyze a single user prompt and decide whether it is PARALLELIZABLE.

A prompt is parallelizable when answering it amounts to several independent
sub-tasks that could run concurrently and be concatenated, with no sub-task
depending on another's output.

## Known Categories
- Repeated Generation: the same request repeated a number of times
  ("write 5 stories about dragons"). Use `n`, never `data`.
- Reading Comprehension: several questions about one shared passage.
- Named Entity Recognition: extract entities from several texts.
- Keyword Extraction: extract keywords from several texts.
- Translation: translate several independent sentences or texts.
- Language Correction: correct several independent sentences.
- Sentiment Analysis: classify the sentiment of several texts.

If the prompt is parallelizable but fits none of these, invent a short
category name, set `is_novel_category` to true and explain it in
`category_description`.

## Decomposition
- `serial`: the prompt rewritten as one single-execution request.
- `template`: the per-item request. Use `{data}` where one item goes and
  `{context}` where shared material goes. A Repeated Generation template
  must NOT mention `{n}` or the count.
- `context`: material shared by every sub-task, or null.
- `data`: list of at least 2 strings, one per sub-task, or null.
- `n`: number of repetitions (at least 2) for Repeated Generation, or null.
- Never populate both `data` and `n`.

## Output Format (JSON only, no prose)
{
  "parallelizable": true | false,
  "category": "string" | null,
  "is_novel_category": true | false,
  "category_description": "string" | null,
  "serial": "string",
  "template": "string" | null,
  "context": "string" | null,
  "data": ["string", "..."] | null,
  "n": number | null
}

If the prompt is a single task, answer with "parallelizable": false, set
"serial" to the prompt and every other field to null or false.
"#;

/// Classifier system instruction, shared by all workers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemInstruction(Arc<str>);

impl SystemInstruction {
    /// Load from `path`, or the built-in instruction when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => {
                let text = fs::read_to_string(path).map_err(|source| ConfigError::Instruction {
                    path: path.to_path_buf(),
                    source,
                })?;
                if text.trim().is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "system instruction {} is empty",
                        path.display()
                    )));
                }
                Ok(Self::new(text))
            }
            None => Ok(Self::default()),
        }
    }

    pub fn new(text: impl Into<String>) -> Self {
        Self(Arc::from(text.into().trim()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SystemInstruction {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_INSTRUCTION)
    }
}

/// User turn for one prompt.
pub fn user_message(prompt: &str) -> String {
    format!("Analyze this prompt: {}", prompt)
}
