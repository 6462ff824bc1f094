//! Registry of categories the model reported outside the curated taxonomy.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::ClassificationResult;

/// Maximum example prompts kept per novel category.
pub const MAX_EXAMPLES: usize = 5;

/// Maximum characters kept from each example prompt.
pub const EXAMPLE_PROMPT_CHARS: usize = 500;

/// One example prompt for a novel category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NovelExample {
    pub prompt: String,
    pub index: u64,
}

/// Everything known about one novel category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NovelCategory {
    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub examples: Vec<NovelExample>,

    #[serde(default)]
    pub count: u64,
}

/// Category name → description, examples and occurrence count.
///
/// Grows monotonically over a run and across resumed runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NovelCategoryRegistry {
    categories: BTreeMap<String, NovelCategory>,
}

impl NovelCategoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a validated result if it carries a novel category.
    ///
    /// Returns `Some(true)` on the first sighting of a category,
    /// `Some(false)` on a repeat, and `None` when the result is not novel.
    pub fn record(&mut self, result: &ClassificationResult) -> Option<bool> {
        let name = result.novel_category()?;
        let discovered = !self.categories.contains_key(name);

        let entry = self.categories.entry(name.to_string()).or_insert_with(|| NovelCategory {
            description: result.category_description.clone().unwrap_or_default(),
            ..Default::default()
        });

        if entry.examples.len() < MAX_EXAMPLES {
            entry.examples.push(NovelExample {
                prompt: result.prompt.chars().take(EXAMPLE_PROMPT_CHARS).collect(),
                index: result.index,
            });
        }
        entry.count += 1;

        Some(discovered)
    }

    pub fn get(&self, name: &str) -> Option<&NovelCategory> {
        self.categories.get(name)
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Categories in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &NovelCategory)> {
        self.categories.iter()
    }

    /// Occurrence count per category.
    pub fn counts(&self) -> BTreeMap<String, u64> {
        self.categories
            .iter()
            .map(|(name, category)| (name.clone(), category.count))
            .collect()
    }
}
