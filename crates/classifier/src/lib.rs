//! Intent classification
//!
//! Stages, cheapest first:
//! - Regex rules over the normalized intent
//! - Labelled example matching
//! - Chat-completion provider, bounded by a deadline
//!
//! Anything that cannot be resolved ends on the human-attendant service.

pub mod batch;
pub mod examples;
pub mod normalize;
pub mod pipeline;
pub mod rules;

pub use batch::{
    evaluate_batch, evaluate_batch_with, BatchReport, BatchStatistics, CaseResult, ServiceStats,
    TestCase,
};
pub use examples::{ExampleMatch, ExampleMatcher};
pub use normalize::{fold_diacritics, normalize, significant_words};
pub use pipeline::{ClassifyOutcome, IntentClassifier, PipelineConfig, LLM_CONFIDENCE};
pub use rules::{RuleClassifier, RuleMatch};

use intent_router_config::ConfigError;
use intent_router_llm::LlmError;
use thiserror::Error;

/// Classifier errors
#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("Invalid rule pattern '{pattern}': {message}")]
    InvalidRule { pattern: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Provider setup failed: {0}")]
    Llm(#[from] LlmError),
}
