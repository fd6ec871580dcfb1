//! Configuration management for the intent router
//!
//! Supports loading configuration from:
//! - YAML files (config/default.yaml, config/{env}.yaml)
//! - Environment variables (INTENT_ROUTER_ prefix, `__` separator)
//!
//! Classifier data lives next to the settings:
//! - training::load_training_examples for the labelled example CSV
//! - rules::RulesConfig for regex rule overrides

pub mod rules;
pub mod settings;
pub mod training;

pub use rules::{RuleDefinition, RulesConfig};
pub use settings::{
    is_local_endpoint, load_settings, AuthConfig, ClassifierConfig, LlmSettings,
    ObservabilityConfig, RuntimeEnvironment, ServerConfig, Settings,
};
pub use training::{load_training_examples, parse_training_examples, TrainingExample};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
