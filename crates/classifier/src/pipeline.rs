//! Classification pipeline
//!
//! Rules first, then labelled examples, then the provider. Every path ends
//! with a catalog service; the provider never supplies names.

use std::sync::Arc;
use std::time::{Duration, Instant};

use intent_router_config::{ClassifierConfig, LlmSettings, RulesConfig, Settings};
use intent_router_config::load_training_examples;
use intent_router_core::{
    Classification, ClassificationSource, FallbackReason, ServiceCatalog, ServiceId,
};
use intent_router_llm::{parse_reply, ClassificationPrompt, LlmBackend, LlmError, LlmFactory};

use crate::examples::{ExampleMatch, ExampleMatcher};
use crate::normalize::normalize;
use crate::rules::RuleClassifier;
use crate::ClassifierError;

/// Confidence attached to a valid provider answer
pub const LLM_CONFIDENCE: f32 = 0.85;

/// Pipeline tuning
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Minimum example score accepted without calling the provider
    pub example_threshold: f32,
    /// Minimum example score used when the provider cannot answer
    pub min_guess_score: f32,
    /// Deadline for the whole provider stage, retries included
    pub deadline: Duration,
    /// Intents are cut to this many characters
    pub max_intent_chars: usize,
    pub prompt_examples_per_service: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&ClassifierConfig::default())
    }
}

impl From<&ClassifierConfig> for PipelineConfig {
    fn from(config: &ClassifierConfig) -> Self {
        Self {
            example_threshold: config.example_threshold,
            min_guess_score: config.min_guess_score,
            deadline: Duration::from_millis(config.deadline_ms),
            max_intent_chars: config.max_intent_chars,
            prompt_examples_per_service: config.prompt_examples_per_service,
        }
    }
}

/// Classification with timing
#[derive(Debug, Clone)]
pub struct ClassifyOutcome {
    pub classification: Classification,
    /// Time spent waiting on the provider, when it was called
    pub llm_latency: Option<Duration>,
    pub elapsed: Duration,
}

/// Intent classifier
pub struct IntentClassifier {
    catalog: ServiceCatalog,
    config: PipelineConfig,
    rules: Option<RuleClassifier>,
    examples: Option<ExampleMatcher>,
    llm: Option<Arc<dyn LlmBackend>>,
    prompt: ClassificationPrompt,
}

impl IntentClassifier {
    /// Classifier with no stages; every intent ends on the fallback service
    pub fn new(catalog: ServiceCatalog, config: PipelineConfig) -> Self {
        let prompt = ClassificationPrompt::new(
            &catalog,
            std::iter::empty::<(ServiceId, &str)>(),
            config.prompt_examples_per_service,
        );

        Self {
            catalog,
            config,
            rules: None,
            examples: None,
            llm: None,
            prompt,
        }
    }

    pub fn with_rules(mut self, rules: RuleClassifier) -> Self {
        self.rules = Some(rules);
        self
    }

    /// Attach labelled examples; they also feed the provider prompt
    pub fn with_examples(mut self, examples: ExampleMatcher) -> Self {
        self.prompt = ClassificationPrompt::new(
            &self.catalog,
            examples.examples(),
            self.config.prompt_examples_per_service,
        );
        self.examples = Some(examples);
        self
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmBackend>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Build every stage from settings
    ///
    /// A missing training file or a provider without credentials disables that
    /// stage with a warning; malformed rules or rule files are errors.
    pub fn from_settings(settings: &Settings) -> Result<Self, ClassifierError> {
        let classifier_config = &settings.classifier;
        let catalog = if classifier_config.extended_catalog {
            ServiceCatalog::extended()
        } else {
            ServiceCatalog::standard()
        };

        let mut classifier = Self::new(catalog.clone(), PipelineConfig::from(classifier_config));

        if classifier_config.rules_enabled {
            let rules = match &classifier_config.rules_path {
                Some(path) => RuleClassifier::from_config(&RulesConfig::load(path)?, &catalog)?,
                None => RuleClassifier::builtin(&catalog)?,
            };
            classifier = classifier.with_rules(rules);
        }

        if classifier_config.examples_enabled {
            match load_training_examples(&classifier_config.training_data_path, &catalog) {
                Ok(examples) => {
                    classifier = classifier.with_examples(ExampleMatcher::new(&examples, &catalog));
                },
                Err(e) => {
                    tracing::warn!(
                        path = %classifier_config.training_data_path,
                        error = %e,
                        "Training examples unavailable, continuing without example matching"
                    );
                },
            }
        }

        if let Some(llm) = create_llm(&settings.llm)? {
            classifier = classifier.with_llm(llm);
        }

        tracing::info!(
            services = catalog.len(),
            rules = classifier.rule_count(),
            examples = classifier.example_count(),
            llm = classifier.llm_enabled(),
            "Intent classifier ready"
        );

        Ok(classifier)
    }

    pub fn catalog(&self) -> &ServiceCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn rule_count(&self) -> usize {
        self.rules.as_ref().map_or(0, RuleClassifier::len)
    }

    pub fn example_count(&self) -> usize {
        self.examples.as_ref().map_or(0, ExampleMatcher::len)
    }

    pub fn llm(&self) -> Option<&Arc<dyn LlmBackend>> {
        self.llm.as_ref()
    }

    pub fn llm_enabled(&self) -> bool {
        self.llm.is_some()
    }

    /// Classify one intent
    pub async fn classify(&self, intent: &str) -> ClassifyOutcome {
        let started = Instant::now();
        let text = truncate_chars(intent.trim(), self.config.max_intent_chars);
        let normalized = normalize(text);

        let (classification, llm_latency) = match self.fast_path(&normalized) {
            FastPath::Decided(classification) => (classification, None),
            FastPath::Undecided(guess) => self.ask_provider(text, guess).await,
        };

        self.outcome(classification, llm_latency, started)
    }

    /// Classify with rules and examples only
    ///
    /// The provider is never called; a miss ends on the best example guess or
    /// the fallback service.
    pub fn classify_local(&self, intent: &str) -> ClassifyOutcome {
        let started = Instant::now();
        let normalized = normalize(truncate_chars(intent.trim(), self.config.max_intent_chars));

        let classification = match self.fast_path(&normalized) {
            FastPath::Decided(classification) => classification,
            FastPath::Undecided(guess) => {
                self.guess_or_fallback(guess.as_ref(), FallbackReason::NoMatch)
            },
        };

        self.outcome(classification, None, started)
    }

    fn outcome(
        &self,
        classification: Classification,
        llm_latency: Option<Duration>,
        started: Instant,
    ) -> ClassifyOutcome {
        let elapsed = started.elapsed();

        tracing::info!(
            service_id = %classification.service.id,
            source = classification.source.as_str(),
            confidence = classification.confidence,
            elapsed_ms = elapsed.as_millis() as u64,
            "Intent classified"
        );

        ClassifyOutcome {
            classification,
            llm_latency,
            elapsed,
        }
    }

    fn fast_path(&self, normalized: &str) -> FastPath {
        if normalized.is_empty() {
            return FastPath::Decided(Classification::fallback(
                &self.catalog,
                FallbackReason::EmptyIntent,
            ));
        }

        if let Some(hit) = self.rules.as_ref().and_then(|r| r.classify_normalized(normalized)) {
            tracing::debug!(rule = hit.rule_index, "Rule matched");
            return FastPath::Decided(Classification::new(
                hit.service,
                1.0,
                ClassificationSource::Rule,
            ));
        }

        let guess = self
            .examples
            .as_ref()
            .and_then(|m| m.best_match_normalized(normalized));

        match guess {
            Some(hit) if hit.score >= self.config.example_threshold => FastPath::Decided(
                Classification::new(hit.service, hit.score, ClassificationSource::Example),
            ),
            guess => FastPath::Undecided(guess),
        }
    }

    async fn ask_provider(
        &self,
        text: &str,
        guess: Option<ExampleMatch>,
    ) -> (Classification, Option<Duration>) {
        let Some(llm) = &self.llm else {
            let classification =
                self.guess_or_fallback(guess.as_ref(), FallbackReason::LlmUnavailable);
            return (classification, None);
        };

        let messages = self.prompt.messages(text);
        let called = Instant::now();
        let result = tokio::time::timeout(self.config.deadline, llm.generate(&messages)).await;
        let latency = Some(called.elapsed());

        let generation = match result {
            Err(_) => {
                tracing::warn!(
                    deadline_ms = self.config.deadline.as_millis() as u64,
                    "Provider deadline exceeded"
                );
                let fallback = self.guess_or_fallback(guess.as_ref(), FallbackReason::Timeout);
                return (fallback, latency);
            },
            Ok(Err(LlmError::Timeout)) => {
                tracing::warn!("Provider request timed out");
                let fallback = self.guess_or_fallback(guess.as_ref(), FallbackReason::Timeout);
                return (fallback, latency);
            },
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Provider call failed");
                let fallback = self.guess_or_fallback(guess.as_ref(), FallbackReason::LlmError);
                return (fallback, latency);
            },
            Ok(Ok(generation)) => generation,
        };

        let choice = match parse_reply(&generation.text) {
            Ok(choice) => choice,
            Err(e) => {
                tracing::warn!(error = %e, "Unusable provider reply");
                return (
                    Classification::fallback(&self.catalog, FallbackReason::InvalidReply),
                    latency,
                );
            },
        };

        let service = u8::try_from(choice.service_id)
            .ok()
            .and_then(|id| self.catalog.get(ServiceId(id)));

        match service {
            Some(service) => (
                Classification::new(service.clone(), LLM_CONFIDENCE, ClassificationSource::Llm),
                latency,
            ),
            None => {
                tracing::warn!(
                    service_id = choice.service_id,
                    "Provider chose a service outside the catalog"
                );
                (
                    Classification::fallback(&self.catalog, FallbackReason::UnknownService),
                    latency,
                )
            },
        }
    }

    fn guess_or_fallback(
        &self,
        guess: Option<&ExampleMatch>,
        reason: FallbackReason,
    ) -> Classification {
        match guess {
            Some(hit) if hit.score >= self.config.min_guess_score => {
                tracing::debug!(reason = %reason, score = hit.score, "Using best example guess");
                Classification::new(
                    hit.service.clone(),
                    hit.score,
                    ClassificationSource::ExampleGuess,
                )
            },
            _ => Classification::fallback(&self.catalog, reason),
        }
    }
}

/// Result of the local stages
enum FastPath {
    Decided(Classification),
    /// Carries the best example below the acceptance threshold
    Undecided(Option<ExampleMatch>),
}

fn create_llm(settings: &LlmSettings) -> Result<Option<Arc<dyn LlmBackend>>, ClassifierError> {
    if settings.enabled && !settings.has_api_key() && !settings.is_local_endpoint() {
        tracing::warn!(
            endpoint = %settings.endpoint,
            "Provider API key missing, classification will not use the provider"
        );
        return Ok(None);
    }

    Ok(LlmFactory::create_backend(settings)?)
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use intent_router_config::TrainingExample;
    use intent_router_llm::{FinishReason, GenerationResult, Message};
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Behaviour {
        Reply(&'static str),
        Fail,
        Hang,
    }

    struct StubBackend {
        behaviour: Behaviour,
        calls: AtomicUsize,
    }

    impl StubBackend {
        fn new(behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                behaviour,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl LlmBackend for StubBackend {
        async fn generate(&self, messages: &[Message]) -> Result<GenerationResult, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(messages.len(), 2);
            match self.behaviour {
                Behaviour::Reply(text) => Ok(GenerationResult {
                    text: text.to_string(),
                    tokens: 8,
                    total_time_ms: 1,
                    attempts: 1,
                    finish_reason: FinishReason::Stop,
                }),
                Behaviour::Fail => Err(LlmError::Api("HTTP 401".to_string())),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Err(LlmError::Timeout)
                },
            }
        }

        async fn is_available(&self) -> bool {
            true
        }

        fn model_name(&self) -> &str {
            "stub"
        }
    }

    fn examples() -> ExampleMatcher {
        ExampleMatcher::new(
            &[
                TrainingExample {
                    service_id: ServiceId(12),
                    intent: "quanto tenho disponível na conta".to_string(),
                },
                TrainingExample {
                    service_id: ServiceId(13),
                    intent: "quero quitar um carnê".to_string(),
                },
            ],
            &ServiceCatalog::standard(),
        )
    }

    fn classifier() -> IntentClassifier {
        let catalog = ServiceCatalog::standard();
        IntentClassifier::new(catalog.clone(), PipelineConfig::default())
            .with_rules(RuleClassifier::builtin(&catalog).unwrap())
            .with_examples(examples())
    }

    #[tokio::test]
    async fn test_empty_intent() {
        let outcome = classifier().classify("  \n ").await;
        assert_eq!(outcome.classification.service.id, ServiceId(15));
        assert_eq!(outcome.classification.fallback_reason(), Some(FallbackReason::EmptyIntent));
    }

    #[tokio::test]
    async fn test_rule_short_circuits_provider() {
        let stub = StubBackend::new(Behaviour::Reply(r#"{"service_id": 1}"#));
        let classifier = classifier().with_llm(stub.clone());

        let outcome = classifier.classify("Quero cancelar meu cartão").await;
        assert_eq!(outcome.classification.service.id, ServiceId(7));
        assert_eq!(outcome.classification.service.name, "Cancelamento de cartão");
        assert_eq!(outcome.classification.source, ClassificationSource::Rule);
        assert!(outcome.llm_latency.is_none());
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_example_match() {
        let outcome = classifier().classify("Quanto tenho disponível na conta?").await;
        assert_eq!(outcome.classification.service.id, ServiceId(12));
        assert_eq!(outcome.classification.source, ClassificationSource::Example);
        assert_eq!(outcome.classification.confidence, 1.0);
    }

    #[tokio::test]
    async fn test_provider_answer_uses_catalog_name() {
        let stub = StubBackend::new(Behaviour::Reply(
            "```json\n{\"service_id\": 5, \"service_name\": \"nome inventado\"}\n```",
        ));
        let outcome = classifier().with_llm(stub.clone()).classify("bom dia").await;

        assert_eq!(outcome.classification.service.id, ServiceId(5));
        assert_eq!(outcome.classification.service.name, "Status de cartão");
        assert_eq!(outcome.classification.source, ClassificationSource::Llm);
        assert_eq!(outcome.classification.confidence, LLM_CONFIDENCE);
        assert!(outcome.llm_latency.is_some());
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_service_falls_back() {
        let stub = StubBackend::new(Behaviour::Reply(r#"{"service_id": 42}"#));
        let outcome = classifier().with_llm(stub).classify("bom dia").await;
        assert_eq!(outcome.classification.service.id, ServiceId(15));
        assert_eq!(outcome.classification.service.name, "Atendimento humano");
        assert_eq!(
            outcome.classification.fallback_reason(),
            Some(FallbackReason::UnknownService)
        );
    }

    #[tokio::test]
    async fn test_garbage_reply_falls_back() {
        let stub = StubBackend::new(Behaviour::Reply("não sei"));
        let outcome = classifier().with_llm(stub).classify("bom dia").await;
        assert_eq!(
            outcome.classification.fallback_reason(),
            Some(FallbackReason::InvalidReply)
        );
    }

    #[tokio::test]
    async fn test_provider_error_falls_back() {
        let stub = StubBackend::new(Behaviour::Fail);
        let outcome = classifier().with_llm(stub).classify("bom dia").await;
        assert_eq!(outcome.classification.service.id, ServiceId(15));
        assert_eq!(outcome.classification.fallback_reason(), Some(FallbackReason::LlmError));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_falls_back() {
        let catalog = ServiceCatalog::standard();
        let config = PipelineConfig {
            deadline: Duration::from_millis(50),
            ..Default::default()
        };
        let classifier =
            IntentClassifier::new(catalog, config).with_llm(StubBackend::new(Behaviour::Hang));

        let outcome = classifier.classify("bom dia").await;
        assert_eq!(outcome.classification.fallback_reason(), Some(FallbackReason::Timeout));
        assert!(outcome.llm_latency.is_some());
    }

    /// Example-only classifier that accepts the 0.6 "quitar carnê" guess
    fn guessing_classifier(config: PipelineConfig) -> IntentClassifier {
        let config = PipelineConfig {
            min_guess_score: 0.5,
            ..config
        };
        IntentClassifier::new(ServiceCatalog::standard(), config).with_examples(examples())
    }

    #[tokio::test]
    async fn test_provider_error_uses_example_guess() {
        let stub = StubBackend::new(Behaviour::Fail);
        let classifier = guessing_classifier(PipelineConfig::default()).with_llm(stub.clone());

        let outcome = classifier.classify("quero quitar o carnê atrasado").await;
        assert_eq!(outcome.classification.service.id, ServiceId(13));
        assert_eq!(outcome.classification.source, ClassificationSource::ExampleGuess);
        assert!((outcome.classification.confidence - 0.6).abs() < 1e-6);
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_uses_example_guess() {
        let config = PipelineConfig {
            deadline: Duration::from_millis(50),
            ..Default::default()
        };
        let classifier =
            guessing_classifier(config).with_llm(StubBackend::new(Behaviour::Hang));

        let outcome = classifier.classify("quero quitar o carnê atrasado").await;
        assert_eq!(outcome.classification.service.id, ServiceId(13));
        assert_eq!(outcome.classification.source, ClassificationSource::ExampleGuess);
        assert!(outcome.llm_latency.is_some());
    }

    #[test]
    fn test_classify_local_skips_provider() {
        let stub = StubBackend::new(Behaviour::Reply(r#"{"service_id": 1}"#));
        let classifier = guessing_classifier(PipelineConfig::default())
            .with_rules(RuleClassifier::builtin(&ServiceCatalog::standard()).unwrap())
            .with_llm(stub.clone());

        let outcome = classifier.classify_local("quero cancelar meu cartão");
        assert_eq!(outcome.classification.source, ClassificationSource::Rule);

        let outcome = classifier.classify_local("quero quitar o carnê atrasado");
        assert_eq!(outcome.classification.source, ClassificationSource::ExampleGuess);

        let outcome = classifier.classify_local("bom dia");
        assert_eq!(outcome.classification.service.id, ServiceId(15));
        assert_eq!(outcome.classification.fallback_reason(), Some(FallbackReason::NoMatch));
        assert!(outcome.llm_latency.is_none());

        let outcome = classifier.classify_local("   ");
        assert_eq!(outcome.classification.fallback_reason(), Some(FallbackReason::EmptyIntent));

        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_guess_when_provider_unavailable() {
        let catalog = ServiceCatalog::standard();
        let config = PipelineConfig {
            min_guess_score: 0.5,
            ..Default::default()
        };
        let classifier = IntentClassifier::new(catalog, config).with_examples(examples());

        // 3 of 4 words shared with "quero quitar um carnê": 0.6
        let outcome = classifier.classify("quero quitar o carnê atrasado").await;
        assert_eq!(outcome.classification.service.id, ServiceId(13));
        assert_eq!(outcome.classification.source, ClassificationSource::ExampleGuess);

        let outcome = classifier.classify("bom dia").await;
        assert_eq!(
            outcome.classification.fallback_reason(),
            Some(FallbackReason::LlmUnavailable)
        );
    }

    #[tokio::test]
    async fn test_intent_is_truncated() {
        let catalog = ServiceCatalog::standard();
        let config = PipelineConfig {
            max_intent_chars: 5,
            ..Default::default()
        };
        let classifier = IntentClassifier::new(catalog.clone(), config)
            .with_rules(RuleClassifier::builtin(&catalog).unwrap());

        // "saldo" survives, the rest is cut
        let outcome = classifier.classify("saldo ... quero cancelar o cartão").await;
        assert_eq!(outcome.classification.service.id, ServiceId(12));
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("cartão", 5), "cartã");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn test_from_settings_without_data() {
        let mut settings = Settings::default();
        settings.llm.enabled = false;
        settings.classifier.training_data_path = "/nonexistent/intents.csv".to_string();
        settings.classifier.extended_catalog = true;

        let classifier = IntentClassifier::from_settings(&settings).unwrap();
        assert_eq!(classifier.catalog().len(), 17);
        assert_eq!(classifier.example_count(), 0);
        assert!(classifier.rule_count() > 0);
        assert!(!classifier.llm_enabled());
    }

    #[test]
    fn test_from_settings_with_rule_file() {
        let dir = tempfile::tempdir().unwrap();
        let rules_path = dir.path().join("rules.yaml");
        std::fs::write(&rules_path, "rules:\n  - service_id: 12\n    pattern: 'saldo'\n").unwrap();
        let csv_path = dir.path().join("intents.csv");
        let csv = "service_id;service_name;intent\n12;Consulta do Saldo;ver saldo\n";
        std::fs::write(&csv_path, csv).unwrap();

        let mut settings = Settings::default();
        settings.llm.enabled = false;
        settings.classifier.rules_path = Some(rules_path.display().to_string());
        settings.classifier.training_data_path = csv_path.display().to_string();

        let classifier = IntentClassifier::from_settings(&settings).unwrap();
        assert_eq!(classifier.rule_count(), 1);
        assert_eq!(classifier.example_count(), 1);
    }
}
