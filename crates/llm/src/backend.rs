//! LLM Backend implementations
//!
//! A single OpenAI-compatible chat-completion backend covers OpenRouter, OpenAI
//! and local servers (vLLM, Ollama's `/v1` API). Classification calls are
//! short, non-streaming and retried with exponential backoff on transient
//! failures.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use intent_router_config::is_local_endpoint;

use crate::prompt::Message;
use crate::LlmError;

/// LLM generation result
#[derive(Debug, Clone)]
pub struct GenerationResult {
    /// Generated text
    pub text: String,
    /// Completion tokens reported by the provider
    pub tokens: usize,
    /// Total generation time across attempts (ms)
    pub total_time_ms: u64,
    /// Attempts used, including the successful one
    pub attempts: u32,
    /// Finish reason
    pub finish_reason: FinishReason,
}

/// Finish reason
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    Other,
}

impl FinishReason {
    fn from_provider(reason: Option<&str>) -> Self {
        match reason {
            Some("stop") | None => FinishReason::Stop,
            Some("length") => FinishReason::Length,
            Some("content_filter") => FinishReason::ContentFilter,
            Some(_) => FinishReason::Other,
        }
    }
}

/// LLM Backend trait
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Generate a response
    async fn generate(&self, messages: &[Message]) -> Result<GenerationResult, LlmError>;

    /// Check if the provider is reachable
    async fn is_available(&self) -> bool;

    /// Get model name
    fn model_name(&self) -> &str;
}

/// Configuration for OpenAI-compatible backends
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    /// API endpoint (OpenRouter: https://openrouter.ai/api/v1)
    pub endpoint: String,
    /// API key
    pub api_key: String,
    /// Model name (openai/gpt-4o-mini, meta-llama/llama-3.1-8b-instruct, ...)
    pub model: String,
    /// Maximum tokens to generate
    pub max_tokens: usize,
    /// Temperature (0-2)
    pub temperature: f32,
    /// Per-attempt request timeout
    pub timeout: Duration,
    /// Maximum retry attempts for transient failures
    pub max_retries: u32,
    /// Initial backoff duration (doubles each retry)
    pub initial_backoff: Duration,
    /// Request `response_format: json_object`
    pub json_mode: bool,
    /// Sent as `X-Title` (OpenRouter app attribution)
    pub app_title: Option<String>,
    /// Sent as `HTTP-Referer` (OpenRouter app attribution)
    pub referer: Option<String>,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://openrouter.ai/api/v1".to_string(),
            api_key: String::new(),
            model: "openai/gpt-4o-mini".to_string(),
            max_tokens: 64,
            temperature: 0.0,
            timeout: Duration::from_secs(5),
            max_retries: 2,
            initial_backoff: Duration::from_millis(100),
            json_mode: true,
            app_title: None,
            referer: None,
        }
    }
}

impl OpenAIConfig {
    /// Create config for OpenRouter
    pub fn openrouter(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            ..Default::default()
        }
    }

    /// Create config for local OpenAI-compatible server (vLLM, Ollama, etc.)
    pub fn local(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: String::new(),
            model: model.into(),
            json_mode: false,
            ..Default::default()
        }
    }

    fn is_local(&self) -> bool {
        is_local_endpoint(&self.endpoint)
    }
}

/// OpenAI-compatible backend
pub struct OpenAIBackend {
    config: OpenAIConfig,
    client: Client,
}

impl OpenAIBackend {
    /// Create new backend
    pub fn new(config: OpenAIConfig) -> Result<Self, LlmError> {
        if config.api_key.trim().is_empty() && !config.is_local() {
            return Err(LlmError::Configuration(
                "API key required for remote endpoints".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// Get the full API URL for chat completions
    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.config.endpoint.trim_end_matches('/'))
    }

    fn models_url(&self) -> String {
        format!("{}/models", self.config.endpoint.trim_end_matches('/'))
    }

    /// Build request headers
    fn build_headers(&self) -> reqwest::header::HeaderMap {
        use reqwest::header::HeaderValue;

        let mut headers = reqwest::header::HeaderMap::new();

        if !self.config.api_key.is_empty() {
            let auth_value = format!("Bearer {}", self.config.api_key);
            if let Ok(val) = HeaderValue::from_str(&auth_value) {
                headers.insert(reqwest::header::AUTHORIZATION, val);
            }
        }

        if let Some(ref title) = self.config.app_title {
            if let Ok(val) = HeaderValue::from_str(title) {
                headers.insert("X-Title", val);
            }
        }

        if let Some(ref referer) = self.config.referer {
            if let Ok(val) = HeaderValue::from_str(referer) {
                headers.insert("HTTP-Referer", val);
            }
        }

        headers.insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );

        headers
    }

    fn build_request(&self, messages: &[Message]) -> OpenAIChatRequest {
        OpenAIChatRequest {
            model: self.config.model.clone(),
            messages: messages.iter().map(OpenAIMessage::from).collect(),
            max_tokens: Some(self.config.max_tokens),
            temperature: Some(self.config.temperature),
            stream: Some(false),
            response_format: self.config.json_mode.then(|| ResponseFormat {
                format_type: "json_object".to_string(),
            }),
        }
    }

    /// Execute a single request (used by retry logic)
    async fn execute_request(
        &self,
        request: &OpenAIChatRequest,
    ) -> Result<OpenAIChatResponse, LlmError> {
        let response = self
            .client
            .post(self.chat_url())
            .headers(self.build_headers())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            // 5xx and 429 are retryable, other 4xx are not
            if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(LlmError::Network(format!("HTTP {}: {}", status, error_text)));
            }
            return Err(LlmError::Api(format!("HTTP {}: {}", status, error_text)));
        }

        response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))
    }

    /// Check if an error is retryable
    fn is_retryable(error: &LlmError) -> bool {
        matches!(error, LlmError::Network(_) | LlmError::Timeout)
    }
}

#[async_trait]
impl LlmBackend for OpenAIBackend {
    /// Generate a response with retry logic for transient failures
    async fn generate(&self, messages: &[Message]) -> Result<GenerationResult, LlmError> {
        let start = std::time::Instant::now();
        let request = self.build_request(messages);

        let mut last_error = None;
        let mut backoff = self.config.initial_backoff;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tracing::warn!(
                    "LLM request failed, retrying in {:?} (attempt {}/{})",
                    backoff,
                    attempt,
                    self.config.max_retries
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }

            match self.execute_request(&request).await {
                Ok(response) => {
                    let choice = response.choices.into_iter().next().ok_or_else(|| {
                        LlmError::InvalidResponse("No choices in response".to_string())
                    })?;

                    let text = choice.message.content.unwrap_or_default();
                    if text.trim().is_empty() {
                        return Err(LlmError::Generation("Empty completion".to_string()));
                    }

                    return Ok(GenerationResult {
                        text,
                        tokens: response.usage.map(|u| u.completion_tokens).unwrap_or(0),
                        total_time_ms: start.elapsed().as_millis() as u64,
                        attempts: attempt + 1,
                        finish_reason: FinishReason::from_provider(choice.finish_reason.as_deref()),
                    });
                },
                Err(e) if Self::is_retryable(&e) => {
                    last_error = Some(e);
                },
                Err(e) => {
                    return Err(e);
                },
            }
        }

        Err(last_error.unwrap_or_else(|| LlmError::Network("Max retries exceeded".to_string())))
    }

    async fn is_available(&self) -> bool {
        self.client
            .get(self.models_url())
            .headers(self.build_headers())
            .timeout(Duration::from_secs(2))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

// OpenAI API types
#[derive(Debug, Serialize)]
struct OpenAIChatRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

impl From<&Message> for OpenAIMessage {
    fn from(msg: &Message) -> Self {
        Self {
            role: msg.role.to_string(),
            content: msg.content.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAIChatResponse {
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    completion_tokens: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::Role;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn completion(content: &str) -> serde_json::Value {
        serde_json::json!({
            "id": "gen-1",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 120, "completion_tokens": 12, "total_tokens": 132}
        })
    }

    fn test_config(endpoint: &str) -> OpenAIConfig {
        OpenAIConfig {
            endpoint: endpoint.to_string(),
            api_key: "sk-or-test".to_string(),
            initial_backoff: Duration::from_millis(1),
            app_title: Some("intent-router".to_string()),
            ..Default::default()
        }
    }

    fn user(content: &str) -> Vec<Message> {
        vec![Message {
            role: Role::User,
            content: content.to_string(),
        }]
    }

    #[test]
    fn test_config_default() {
        let config = OpenAIConfig::default();
        assert_eq!(config.endpoint, "https://openrouter.ai/api/v1");
        assert_eq!(config.temperature, 0.0);
        assert!(config.json_mode);
        assert!(config.api_key.is_empty());
    }

    #[test]
    fn test_backend_creation() {
        // Local endpoint should work without API key
        let config = OpenAIConfig::local("http://localhost:8000/v1", "llama-3");
        assert!(OpenAIBackend::new(config).is_ok());

        // Remote endpoint requires API key
        assert!(OpenAIBackend::new(OpenAIConfig::default()).is_err());
        let config = OpenAIConfig::local("http://localhost.example.com/v1", "llama-3");
        assert!(OpenAIBackend::new(config).is_err());

        let config = OpenAIConfig::openrouter("sk-or-xxx", "openai/gpt-4o-mini");
        assert!(OpenAIBackend::new(config).is_ok());
    }

    #[test]
    fn test_chat_url() {
        let config = OpenAIConfig {
            endpoint: "https://openrouter.ai/api/v1/".to_string(),
            api_key: "k".to_string(),
            ..Default::default()
        };
        let backend = OpenAIBackend::new(config).unwrap();
        assert_eq!(backend.chat_url(), "https://openrouter.ai/api/v1/chat/completions");
    }

    #[test]
    fn test_request_serialization() {
        let backend = OpenAIBackend::new(test_config("https://openrouter.ai/api/v1")).unwrap();
        let json = serde_json::to_value(backend.build_request(&user("Hello"))).unwrap();

        assert_eq!(json["model"], "openai/gpt-4o-mini");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["response_format"]["type"], "json_object");
        assert_eq!(json["stream"], false);

        let local = OpenAIBackend::new(OpenAIConfig::local("http://localhost:1/v1", "m")).unwrap();
        let json = serde_json::to_value(local.build_request(&user("Hello"))).unwrap();
        assert!(json.get("response_format").is_none());
    }

    #[tokio::test]
    async fn test_generate_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-or-test"))
            .and(header("x-title", "intent-router"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(
                r#"{"service_id": 7, "service_name": "Cancelamento de cartão"}"#,
            )))
            .expect(1)
            .mount(&server)
            .await;

        let backend = OpenAIBackend::new(test_config(&server.uri())).unwrap();
        let result = backend.generate(&user("quero cancelar meu cartão")).await.unwrap();

        assert!(result.text.contains("\"service_id\": 7"));
        assert_eq!(result.tokens, 12);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.finish_reason, FinishReason::Stop);
    }

    #[tokio::test]
    async fn test_generate_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("3")))
            .mount(&server)
            .await;

        let backend = OpenAIBackend::new(test_config(&server.uri())).unwrap();
        let result = backend.generate(&user("segunda via da fatura")).await.unwrap();

        assert_eq!(result.text, "3");
        assert_eq!(result.attempts, 2);
    }

    #[tokio::test]
    async fn test_generate_retries_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("12")))
            .expect(1)
            .mount(&server)
            .await;

        let backend = OpenAIBackend::new(test_config(&server.uri())).unwrap();
        let result = backend.generate(&user("ver saldo")).await.unwrap();

        assert_eq!(result.text, "12");
        assert_eq!(result.attempts, 3);
    }

    #[tokio::test]
    async fn test_generate_does_not_retry_client_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
            .expect(1)
            .mount(&server)
            .await;

        let backend = OpenAIBackend::new(test_config(&server.uri())).unwrap();
        let err = backend.generate(&user("oi")).await.unwrap_err();

        assert!(matches!(err, LlmError::Api(msg) if msg.contains("401")));
    }

    #[tokio::test]
    async fn test_generate_gives_up_after_max_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let backend = OpenAIBackend::new(test_config(&server.uri())).unwrap();
        let err = backend.generate(&user("oi")).await.unwrap_err();

        assert!(matches!(err, LlmError::Network(_)));
    }

    #[tokio::test]
    async fn test_generate_without_choices() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})),
            )
            .mount(&server)
            .await;

        let backend = OpenAIBackend::new(test_config(&server.uri())).unwrap();
        let err = backend.generate(&user("oi")).await.unwrap_err();

        assert!(matches!(err, LlmError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_is_available() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
            .mount(&server)
            .await;

        let backend = OpenAIBackend::new(test_config(&server.uri())).unwrap();
        assert!(backend.is_available().await);
        assert_eq!(backend.model_name(), "openai/gpt-4o-mini");
    }
}
