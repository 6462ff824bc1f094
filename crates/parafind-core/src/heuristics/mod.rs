//! Linguistic heuristics for decomposability.
//!
//! `lexicon` holds the word lists and patterns; `signals` combines them
//! with the shape of a claimed decomposition into a confidence tier.

pub mod lexicon;
pub mod signals;

pub use signals::{HeuristicSignals, MEDIUM_CONFIDENCE_CATEGORIES, MEDIUM_CONFIDENCE_MIN_DATA};
