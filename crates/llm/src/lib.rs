//! Chat-completion integration for intent classification
//!
//! Features:
//! - OpenAI-compatible backend (OpenRouter, OpenAI, local servers)
//! - Retries with exponential backoff for transient failures
//! - Classification prompt built from the service catalog
//! - Tolerant parsing of the model's textual JSON reply

pub mod backend;
pub mod factory;
pub mod prompt;
pub mod reply;

pub use backend::{FinishReason, GenerationResult, LlmBackend, OpenAIBackend, OpenAIConfig};
pub use factory::LlmFactory;
pub use prompt::{ClassificationPrompt, Message, Role};
pub use reply::{parse_reply, ReplyChoice, ReplyError};

use thiserror::Error;

/// LLM errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Generation error: {0}")]
    Generation(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout")]
    Timeout,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}
