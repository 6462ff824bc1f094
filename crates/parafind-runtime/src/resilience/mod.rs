//! Resilience patterns for parafind-runtime.
//!
//! This module provides exponential-backoff retry for classifier calls,
//! driven by `backon`.

mod retry;

pub use retry::RetryPolicy;
