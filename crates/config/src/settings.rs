//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use url::{Host, Url};

use crate::ConfigError;

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    /// Development mode - relaxed validation
    #[default]
    Development,
    /// Staging mode - stricter validation
    Staging,
    /// Production mode - all validations enforced
    Production,
}

impl RuntimeEnvironment {
    /// Check if this is a production environment
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    /// Check if strict validation should be applied
    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Runtime environment (development, staging, production)
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Chat-completion provider
    #[serde(default)]
    pub llm: LlmSettings,

    /// Classification pipeline
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    /// Create default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_llm()?;
        self.validate_classifier()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        let server = &self.server;

        if server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port".to_string(),
                message: "Port cannot be 0".to_string(),
            });
        }

        if server.max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.max_connections".to_string(),
                message: "Max connections must be at least 1".to_string(),
            });
        }

        if server.timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.timeout_seconds".to_string(),
                message: "Timeout must be at least 1 second".to_string(),
            });
        }

        if self.environment.is_production() && server.auth.enabled && server.auth.api_key.is_none()
        {
            return Err(ConfigError::InvalidValue {
                field: "server.auth.api_key".to_string(),
                message: "API key must be set when auth is enabled in production".to_string(),
            });
        }

        if self.environment.is_production() && server.cors_enabled && server.cors_origins.is_empty()
        {
            tracing::warn!(
                "CORS is enabled in production but no origins are configured. \
                 This may block legitimate requests."
            );
        }

        Ok(())
    }

    fn validate_llm(&self) -> Result<(), ConfigError> {
        let llm = &self.llm;

        if !(0.0..=2.0).contains(&llm.temperature) {
            return Err(ConfigError::InvalidValue {
                field: "llm.temperature".to_string(),
                message: format!("Must be between 0.0 and 2.0, got {}", llm.temperature),
            });
        }

        if llm.max_tokens == 0 {
            return Err(ConfigError::InvalidValue {
                field: "llm.max_tokens".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        if llm.timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "llm.timeout_ms".to_string(),
                message: "Timeout must be at least 1ms".to_string(),
            });
        }

        if llm.enabled && !llm.has_api_key() && !llm.is_local_endpoint() {
            if self.environment.is_strict() {
                return Err(ConfigError::InvalidValue {
                    field: "llm.api_key".to_string(),
                    message: "API key required for remote provider endpoints".to_string(),
                });
            }
            tracing::warn!(
                endpoint = %llm.endpoint,
                "No provider API key configured; intents missing the fast path will go to the fallback service"
            );
        }

        Ok(())
    }

    fn validate_classifier(&self) -> Result<(), ConfigError> {
        let classifier = &self.classifier;

        if !(classifier.example_threshold > 0.0 && classifier.example_threshold <= 1.0) {
            return Err(ConfigError::InvalidValue {
                field: "classifier.example_threshold".to_string(),
                message: format!("Must be in (0, 1], got {}", classifier.example_threshold),
            });
        }

        if !(0.0..=1.0).contains(&classifier.min_guess_score) {
            return Err(ConfigError::InvalidValue {
                field: "classifier.min_guess_score".to_string(),
                message: format!("Must be in [0, 1], got {}", classifier.min_guess_score),
            });
        }

        if classifier.deadline_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "classifier.deadline_ms".to_string(),
                message: "Deadline must be at least 1ms".to_string(),
            });
        }

        if classifier.max_intent_chars == 0 {
            return Err(ConfigError::InvalidValue {
                field: "classifier.max_intent_chars".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum concurrent in-flight requests
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// CORS allowed origins
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Enable authentication (set to false for development)
    #[serde(default)]
    pub enabled: bool,

    /// API key for simple authentication (INTENT_ROUTER__SERVER__AUTH__API_KEY)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Paths that bypass authentication (e.g., health checks)
    #[serde(default = "default_public_paths")]
    pub public_paths: Vec<String>,
}

fn default_public_paths() -> Vec<String> {
    vec![
        "/api/healthz".to_string(),
        "/ready".to_string(),
        "/metrics".to_string(),
    ]
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: None,
            public_paths: default_public_paths(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    std::env::var("PORT")
        .ok()
        .and_then(|p| p.trim().parse().ok())
        .unwrap_or(8080)
}
fn default_max_connections() -> usize {
    1024
}
fn default_timeout() -> u64 {
    30
}
fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_connections: default_max_connections(),
            timeout_seconds: default_timeout(),
            cors_enabled: default_true(),
            cors_origins: Vec::new(),
            auth: AuthConfig::default(),
        }
    }
}

/// Chat-completion provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    /// Use the provider when the fast path misses
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// OpenAI-compatible base URL
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    /// Bearer key (defaults to OPENROUTER_API_KEY)
    #[serde(default = "default_llm_api_key")]
    pub api_key: Option<String>,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default)]
    pub temperature: f32,

    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: usize,

    /// Per-attempt HTTP timeout
    #[serde(default = "default_llm_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_llm_max_retries")]
    pub max_retries: u32,

    /// Initial backoff, doubled after every failed attempt
    #[serde(default = "default_llm_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Ask the provider for a JSON object reply
    #[serde(default = "default_true")]
    pub json_mode: bool,

    /// Sent as X-Title
    #[serde(default = "default_app_title")]
    pub app_title: Option<String>,

    /// Sent as HTTP-Referer
    #[serde(default)]
    pub referer: Option<String>,
}

impl LlmSettings {
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().map(|k| !k.trim().is_empty()).unwrap_or(false)
    }

    pub fn is_local_endpoint(&self) -> bool {
        is_local_endpoint(&self.endpoint)
    }
}

/// Whether an endpoint URL points at this machine (`localhost` or a loopback IP)
pub fn is_local_endpoint(endpoint: &str) -> bool {
    match Url::parse(endpoint).ok().as_ref().and_then(Url::host) {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}

fn default_llm_endpoint() -> String {
    "https://openrouter.ai/api/v1".to_string()
}
fn default_llm_api_key() -> Option<String> {
    std::env::var("OPENROUTER_API_KEY")
        .ok()
        .filter(|k| !k.trim().is_empty())
}
fn default_llm_model() -> String {
    "openai/gpt-4o-mini".to_string()
}
fn default_llm_max_tokens() -> usize {
    64
}
fn default_llm_timeout_ms() -> u64 {
    5000
}
fn default_llm_max_retries() -> u32 {
    2
}
fn default_llm_initial_backoff_ms() -> u64 {
    100
}
fn default_app_title() -> Option<String> {
    Some("intent-router".to_string())
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_llm_endpoint(),
            api_key: default_llm_api_key(),
            model: default_llm_model(),
            temperature: 0.0,
            max_tokens: default_llm_max_tokens(),
            timeout_ms: default_llm_timeout_ms(),
            max_retries: default_llm_max_retries(),
            initial_backoff_ms: default_llm_initial_backoff_ms(),
            json_mode: true,
            app_title: default_app_title(),
            referer: None,
        }
    }
}

/// Classification pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Run regex rules before anything else
    #[serde(default = "default_true")]
    pub rules_enabled: bool,

    /// YAML file replacing the built-in rules
    #[serde(default)]
    pub rules_path: Option<String>,

    /// Match against labelled examples before calling the provider
    #[serde(default = "default_true")]
    pub examples_enabled: bool,

    /// Labelled example CSV (service_id;service_name;intent)
    #[serde(default = "default_training_data_path")]
    pub training_data_path: String,

    /// Minimum example score accepted without the provider
    #[serde(default = "default_example_threshold")]
    pub example_threshold: f32,

    /// Minimum example score returned when the provider cannot answer
    #[serde(default = "default_min_guess_score")]
    pub min_guess_score: f32,

    /// Example utterances per service included in the prompt
    #[serde(default = "default_prompt_examples")]
    pub prompt_examples_per_service: usize,

    /// Overall deadline for the provider stage
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,

    /// Intents are truncated to this many characters
    #[serde(default = "default_max_intent_chars")]
    pub max_intent_chars: usize,

    /// Include service 17 (registration data updates)
    #[serde(default)]
    pub extended_catalog: bool,
}

fn default_training_data_path() -> String {
    std::env::var("TRAINING_DATA_PATH")
        .ok()
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| "assets/intents_pre_loaded.csv".to_string())
}
fn default_example_threshold() -> f32 {
    0.8
}
fn default_min_guess_score() -> f32 {
    0.6
}
fn default_prompt_examples() -> usize {
    3
}
fn default_deadline_ms() -> u64 {
    8000
}
fn default_max_intent_chars() -> usize {
    500
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            rules_enabled: true,
            rules_path: None,
            examples_enabled: true,
            training_data_path: default_training_data_path(),
            example_threshold: default_example_threshold(),
            min_guess_score: default_min_guess_score(),
            prompt_examples_per_service: default_prompt_examples(),
            deadline_ms: default_deadline_ms(),
            max_intent_chars: default_max_intent_chars(),
            extended_catalog: false,
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub log_json: bool,

    /// Enable metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_enabled: true,
        }
    }
}

/// Load settings from files and environment
///
/// Priority (highest to lowest):
/// 1. Environment variables (INTENT_ROUTER__ prefix)
/// 2. config/{env}.yaml (if env specified)
/// 3. config/default.yaml
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("INTENT_ROUTER")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}
