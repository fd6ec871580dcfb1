//! Regex rule configuration
//!
//! Rules are evaluated in file order; the first matching rule decides the service.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::ConfigError;

/// Rules configuration loaded from a rules YAML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RulesConfig {
    #[serde(default)]
    pub rules: Vec<RuleDefinition>,
}

/// Single rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDefinition {
    /// Target service id
    pub service_id: u8,
    /// Regex pattern, matched case-insensitively
    pub pattern: String,
    /// Optional note shown in logs
    #[serde(default)]
    pub description: Option<String>,
}

impl RulesConfig {
    /// Load from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ConfigError::FileNotFound(format!("{}: {}", path.as_ref().display(), e))
        })?;

        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        Ok(config)
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
