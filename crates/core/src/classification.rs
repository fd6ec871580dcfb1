//! Classification results

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::catalog::{Service, ServiceCatalog};

/// Why a classification ended on the human-attendant service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// Intent was blank after trimming
    EmptyIntent,
    /// No provider configured or provider disabled
    LlmUnavailable,
    /// Local stages found nothing and the provider was not consulted
    NoMatch,
    /// Provider call failed
    LlmError,
    /// Provider did not answer before the deadline
    Timeout,
    /// Reply could not be parsed
    InvalidReply,
    /// Reply named a service outside the catalog
    UnknownService,
}

impl FallbackReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmptyIntent => "empty_intent",
            Self::LlmUnavailable => "llm_unavailable",
            Self::NoMatch => "no_match",
            Self::LlmError => "llm_error",
            Self::Timeout => "timeout",
            Self::InvalidReply => "invalid_reply",
            Self::UnknownService => "unknown_service",
        }
    }
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which stage produced a classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ClassificationSource {
    /// Regex rule matched
    Rule,
    /// Labelled example matched above threshold
    Example,
    /// Provider answered with a valid service
    Llm,
    /// Best example guess used after the provider could not answer
    ExampleGuess,
    Fallback { reason: FallbackReason },
}

impl ClassificationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rule => "rule",
            Self::Example => "example",
            Self::Llm => "llm",
            Self::ExampleGuess => "example_guess",
            Self::Fallback { .. } => "fallback",
        }
    }
}

/// Final classification of one intent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub service: Service,
    /// Confidence in [0, 1]
    pub confidence: f32,
    pub source: ClassificationSource,
}

impl Classification {
    pub fn new(service: Service, confidence: f32, source: ClassificationSource) -> Self {
        Self {
            service,
            confidence: confidence.clamp(0.0, 1.0),
            source,
        }
    }

    /// Human-attendant classification
    pub fn fallback(catalog: &ServiceCatalog, reason: FallbackReason) -> Self {
        Self {
            service: catalog.fallback(),
            confidence: 0.0,
            source: ClassificationSource::Fallback { reason },
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.source, ClassificationSource::Fallback { .. })
    }

    pub fn fallback_reason(&self) -> Option<FallbackReason> {
        match self.source {
            ClassificationSource::Fallback { reason } => Some(reason),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ServiceId, FALLBACK_SERVICE_ID};

    #[test]
    fn test_fallback_classification() {
        let catalog = ServiceCatalog::standard();
        let c = Classification::fallback(&catalog, FallbackReason::Timeout);
        assert!(c.is_fallback());
        assert_eq!(c.service.id, FALLBACK_SERVICE_ID);
        assert_eq!(c.fallback_reason(), Some(FallbackReason::Timeout));
        assert_eq!(c.source.as_str(), "fallback");
    }

    #[test]
    fn test_confidence_is_clamped() {
        let catalog = ServiceCatalog::standard();
        let c = Classification::new(
            catalog.resolve(ServiceId(4)),
            1.7,
            ClassificationSource::Rule,
        );
        assert_eq!(c.confidence, 1.0);
        assert!(!c.is_fallback());
        assert_eq!(c.fallback_reason(), None);
    }

    #[test]
    fn test_source_serialization() {
        let source = ClassificationSource::Fallback {
            reason: FallbackReason::InvalidReply,
        };
        let json = serde_json::to_string(&source).unwrap();
        assert_eq!(json, r#"{"kind":"fallback","reason":"invalid_reply"}"#);
    }
}
