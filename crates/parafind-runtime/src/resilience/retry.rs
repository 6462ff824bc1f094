//! Exponential backoff for transient provider failures.
//!
//! Delay before retry `k` (0-based) is `factor * base^k`, capped at
//! `max_delay`, optionally jittered. With the defaults (8 attempts,
//! base 2, factor 3s) the schedule is 3s, 6s, 12s, ... 192s.

use std::time::Duration;

use backon::ExponentialBuilder;
use serde::{Deserialize, Serialize};

use crate::config::duration_str;

/// Retry policy for one classification call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first call
    pub max_attempts: u32,

    /// Growth factor between consecutive delays
    pub base: f32,

    /// Delay before the first retry
    #[serde(with = "duration_str")]
    pub factor: Duration,

    /// Upper bound on any single delay
    #[serde(with = "duration_str")]
    pub max_delay: Duration,

    /// Randomize delays to spread retries from concurrent workers
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            base: 2.0,
            factor: Duration::from_secs(3),
            max_delay: Duration::from_secs(300),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Number of retries after the first attempt.
    pub fn max_retries(&self) -> usize {
        self.max_attempts.saturating_sub(1) as usize
    }

    /// Un-jittered delay before retry `retry` (0-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let scaled = self.factor.as_secs_f64() * f64::from(self.base).powi(retry as i32);
        let capped = scaled.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// Sum of un-jittered delays if every retry is used.
    pub fn worst_case_wait(&self) -> Duration {
        (0..self.max_retries() as u32).map(|k| self.delay_for(k)).sum()
    }

    /// Backoff schedule for `backon`.
    pub fn backoff(&self) -> ExponentialBuilder {
        let builder = ExponentialBuilder::default()
            .with_min_delay(self.factor)
            .with_max_delay(self.max_delay)
            .with_factor(self.base)
            .with_max_times(self.max_retries());

        if self.jitter {
            builder.with_jitter()
        } else {
            builder
        }
    }
}
