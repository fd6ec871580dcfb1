//! Application State
//!
//! Shared state across all handlers.

use parking_lot::RwLock;
use std::sync::Arc;

use intent_router_classifier::IntentClassifier;
use intent_router_config::{load_settings, Settings};

use crate::ServerError;

/// Application state
#[derive(Clone)]
pub struct AppState {
    /// Configuration wrapped in RwLock for hot-reload support
    pub config: Arc<RwLock<Settings>>,
    /// Current classifier; replaced wholesale on reload
    classifier: Arc<RwLock<Arc<IntentClassifier>>>,
    /// Environment name for config reload
    env: Option<String>,
}

impl AppState {
    /// Build state and the classifier from settings
    pub fn new(config: Settings) -> Result<Self, ServerError> {
        Self::with_env(config, None)
    }

    /// Build state with environment name for reload support
    pub fn with_env(config: Settings, env: Option<String>) -> Result<Self, ServerError> {
        let classifier = IntentClassifier::from_settings(&config)?;
        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            classifier: Arc::new(RwLock::new(Arc::new(classifier))),
            env,
        })
    }

    /// State around an already built classifier
    pub fn with_classifier(config: Settings, classifier: IntentClassifier) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            classifier: Arc::new(RwLock::new(Arc::new(classifier))),
            env: None,
        }
    }

    /// Current classifier
    ///
    /// Returns an owned handle so no lock is held across the classification.
    pub fn classifier(&self) -> Arc<IntentClassifier> {
        self.classifier.read().clone()
    }

    /// Reload configuration from files and rebuild the classifier
    ///
    /// Nothing is swapped unless both steps succeed.
    pub fn reload_config(&self) -> Result<(), String> {
        let new_config = load_settings(self.env.as_deref())
            .map_err(|e| format!("Failed to reload config: {}", e))?;
        self.apply_settings(new_config)
    }

    /// Rebuild the classifier from `new_config` and swap both in
    ///
    /// On error the current settings and classifier stay in place.
    pub fn apply_settings(&self, new_config: Settings) -> Result<(), String> {
        let new_classifier = IntentClassifier::from_settings(&new_config)
            .map_err(|e| format!("Failed to rebuild classifier: {}", e))?;

        *self.classifier.write() = Arc::new(new_classifier);
        *self.config.write() = new_config;

        tracing::info!("Configuration reloaded successfully");
        Ok(())
    }

    /// Get a read guard to the current configuration
    pub fn get_config(&self) -> parking_lot::RwLockReadGuard<'_, Settings> {
        self.config.read()
    }
}
