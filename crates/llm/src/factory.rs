//! LLM Factory
//!
//! Creates the provider backend from [`LlmSettings`].

use std::sync::Arc;
use std::time::Duration;

use intent_router_config::LlmSettings;

use crate::{
    backend::{LlmBackend, OpenAIBackend, OpenAIConfig},
    LlmError,
};

/// Factory for creating LLM backends
pub struct LlmFactory;

impl LlmFactory {
    /// Provider config derived from settings
    pub fn config_from_settings(settings: &LlmSettings) -> OpenAIConfig {
        OpenAIConfig {
            endpoint: settings.endpoint.clone(),
            api_key: settings.api_key.clone().unwrap_or_default(),
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            timeout: Duration::from_millis(settings.timeout_ms),
            max_retries: settings.max_retries,
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
            json_mode: settings.json_mode,
            app_title: settings.app_title.clone(),
            referer: settings.referer.clone(),
        }
    }

    /// Create a backend, or `None` when the provider is disabled
    pub fn create_backend(
        settings: &LlmSettings,
    ) -> Result<Option<Arc<dyn LlmBackend>>, LlmError> {
        if !settings.enabled {
            tracing::info!("LLM provider disabled by configuration");
            return Ok(None);
        }

        let backend = OpenAIBackend::new(Self::config_from_settings(settings))?;
        tracing::info!(
            endpoint = %settings.endpoint,
            model = %settings.model,
            "LLM provider configured"
        );
        Ok(Some(Arc::new(backend)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_provider() {
        let settings = LlmSettings {
            enabled: false,
            ..Default::default()
        };
        assert!(LlmFactory::create_backend(&settings).unwrap().is_none());
    }

    #[test]
    fn test_missing_key_for_remote_endpoint() {
        let settings = LlmSettings {
            api_key: None,
            ..Default::default()
        };
        assert!(matches!(
            LlmFactory::create_backend(&settings),
            Err(LlmError::Configuration(_))
        ));
    }

    #[test]
    fn test_backend_from_settings() {
        let settings = LlmSettings {
            api_key: Some("sk-or-test".to_string()),
            model: "anthropic/claude-3-haiku".to_string(),
            timeout_ms: 1500,
            ..Default::default()
        };
        let config = LlmFactory::config_from_settings(&settings);
        assert_eq!(config.timeout, Duration::from_millis(1500));
        assert_eq!(config.api_key, "sk-or-test");

        let backend = LlmFactory::create_backend(&settings).unwrap().unwrap();
        assert_eq!(backend.model_name(), "anthropic/claude-3-haiku");
    }
}
