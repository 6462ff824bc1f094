//! Token usage and cost accounting across a run.

use serde::{Deserialize, Serialize};

use crate::providers::TokenUsage;

/// USD per million tokens.
#[derive(Debug, Clone, Copy)]
struct Rates {
    input: f64,
    output: f64,
    cache_write: f64,
    cache_read: f64,
}

const HAIKU_3_5: Rates = Rates { input: 0.8, output: 4.0, cache_write: 1.0, cache_read: 0.08 };

/// First matching model-name fragment wins; unknown models bill as 3.5 Haiku.
const PRICING: &[(&str, Rates)] = &[
    ("3-5-haiku", HAIKU_3_5),
    ("haiku-4", Rates { input: 1.0, output: 5.0, cache_write: 1.25, cache_read: 0.1 }),
    ("sonnet", Rates { input: 3.0, output: 15.0, cache_write: 3.75, cache_read: 0.3 }),
    ("opus-4-5", Rates { input: 5.0, output: 25.0, cache_write: 6.25, cache_read: 0.5 }),
    ("opus", Rates { input: 15.0, output: 75.0, cache_write: 18.75, cache_read: 1.5 }),
];

impl Rates {
    fn for_model(model: &str) -> Self {
        PRICING
            .iter()
            .find(|(fragment, _)| model.contains(fragment))
            .map_or(HAIKU_3_5, |(_, rates)| *rates)
    }

    fn cost(&self, usage: &TokenUsage) -> f64 {
        let millions = |tokens: u32| f64::from(tokens) / 1_000_000.0;
        millions(usage.prompt_tokens) * self.input
            + millions(usage.completion_tokens) * self.output
            + millions(usage.cache_creation_tokens) * self.cache_write
            + millions(usage.cache_read_tokens) * self.cache_read
    }
}

/// Running totals for one classifier client, reported in the run summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmUsage {
    pub total_tokens: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    /// Provider calls that returned a response
    pub llm_calls: u64,
    /// Classifications answered from the in-process cache
    pub cache_hits: u64,
    pub cache_creation_tokens: u64,
    pub cache_read_tokens: u64,
    pub estimated_cost: f64,
}

impl LlmUsage {
    pub fn add(&mut self, usage: &TokenUsage, model: &str) {
        self.llm_calls += 1;
        self.total_tokens += u64::from(usage.total());
        self.prompt_tokens += u64::from(usage.prompt_tokens);
        self.completion_tokens += u64::from(usage.completion_tokens);
        self.cache_creation_tokens += u64::from(usage.cache_creation_tokens);
        self.cache_read_tokens += u64::from(usage.cache_read_tokens);
        self.estimated_cost += Rates::for_model(model).cost(usage);
    }

    pub fn add_cache_hit(&mut self) {
        self.cache_hits += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulates() {
        let mut usage = LlmUsage::default();
        let tokens = TokenUsage {
            prompt_tokens: 1000,
            completion_tokens: 200,
            cache_read_tokens: 800,
            cache_creation_tokens: 0,
        };

        usage.add(&tokens, "claude-3-5-haiku-20241022");
        usage.add(&tokens, "claude-3-5-haiku-20241022");
        usage.add_cache_hit();

        assert_eq!(usage.llm_calls, 2);
        assert_eq!(usage.total_tokens, 2400);
        assert_eq!(usage.cache_read_tokens, 1600);
        assert_eq!(usage.cache_hits, 1);
    }

    #[test]
    fn test_cost_by_model() {
        let million_in = TokenUsage {
            prompt_tokens: 1_000_000,
            ..Default::default()
        };

        let mut sonnet = LlmUsage::default();
        sonnet.add(&million_in, "claude-sonnet-4-5");
        assert!((sonnet.estimated_cost - 3.0).abs() < 1e-9);

        let mut unknown = LlmUsage::default();
        unknown.add(&million_in, "some-local-model");
        assert!((unknown.estimated_cost - 0.8).abs() < 1e-9);
    }
}
