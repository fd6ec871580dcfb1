//! Batch evaluation of labelled intents

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use intent_router_core::ServiceId;

use crate::pipeline::{ClassifyOutcome, IntentClassifier};

const HIGH_CONFIDENCE: f32 = 0.8;
const MEDIUM_CONFIDENCE: f32 = 0.5;

/// One intent to evaluate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub intent: String,
    /// Expected service; unlabelled cases only count towards confidence stats
    #[serde(default)]
    pub expected_service_id: Option<ServiceId>,
}

/// Result for one case
#[derive(Debug, Clone, Serialize)]
pub struct CaseResult {
    pub intent: String,
    pub predicted_service_id: ServiceId,
    pub predicted_service_name: String,
    pub confidence: f32,
    pub source: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_service_id: Option<ServiceId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,
}

/// Per expected-service statistics
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    pub service_id: ServiceId,
    pub service_name: String,
    pub total_tests: usize,
    pub correct_predictions: usize,
    /// Percentage in [0, 100]
    pub accuracy_rate: f32,
    pub average_confidence: f32,
}

/// Aggregate statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchStatistics {
    pub total_tests: usize,
    /// Cases carrying an expected service
    pub labelled_tests: usize,
    pub correct_predictions: usize,
    pub incorrect_predictions: usize,
    /// Percentage of labelled cases predicted correctly
    pub accuracy_rate: f32,
    pub average_confidence: f32,
    pub high_confidence: usize,
    pub medium_confidence: usize,
    pub low_confidence: usize,
    pub fallbacks: usize,
    pub by_service: BTreeMap<ServiceId, ServiceStats>,
}

/// Batch evaluation output
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub results: Vec<CaseResult>,
    pub statistics: BatchStatistics,
}

/// Classify every case in order with the local stages and aggregate the results
pub fn evaluate_batch(classifier: &IntentClassifier, cases: &[TestCase]) -> BatchReport {
    evaluate_batch_with(classifier, cases, |_| {})
}

/// Same as [`evaluate_batch`], handing each outcome to `observe` as it is produced
pub fn evaluate_batch_with<F>(
    classifier: &IntentClassifier,
    cases: &[TestCase],
    mut observe: F,
) -> BatchReport
where
    F: FnMut(&ClassifyOutcome),
{
    let mut results = Vec::with_capacity(cases.len());
    let mut stats = BatchStatistics::default();
    let mut confidence_sum = 0.0f32;

    for case in cases {
        let outcome = classifier.classify_local(&case.intent);
        observe(&outcome);

        let classification = outcome.classification;
        let confidence = classification.confidence;

        stats.total_tests += 1;
        confidence_sum += confidence;
        if classification.is_fallback() {
            stats.fallbacks += 1;
        }
        if confidence >= HIGH_CONFIDENCE {
            stats.high_confidence += 1;
        } else if confidence >= MEDIUM_CONFIDENCE {
            stats.medium_confidence += 1;
        } else {
            stats.low_confidence += 1;
        }

        let is_correct = case.expected_service_id.map(|expected| {
            let correct = classification.service.id == expected;
            stats.labelled_tests += 1;
            if correct {
                stats.correct_predictions += 1;
            }

            let entry = stats.by_service.entry(expected).or_insert_with(|| ServiceStats {
                service_id: expected,
                service_name: classifier
                    .catalog()
                    .name_of(expected)
                    .unwrap_or_default()
                    .to_string(),
                total_tests: 0,
                correct_predictions: 0,
                accuracy_rate: 0.0,
                average_confidence: 0.0,
            });
            entry.total_tests += 1;
            entry.average_confidence += confidence;
            if correct {
                entry.correct_predictions += 1;
            }
            correct
        });

        results.push(CaseResult {
            intent: case.intent.clone(),
            predicted_service_id: classification.service.id,
            predicted_service_name: classification.service.name,
            confidence,
            source: classification.source.as_str(),
            expected_service_id: case.expected_service_id,
            is_correct,
        });
    }

    if stats.total_tests > 0 {
        stats.average_confidence = confidence_sum / stats.total_tests as f32;
    }
    if stats.labelled_tests > 0 {
        stats.incorrect_predictions = stats.labelled_tests - stats.correct_predictions;
        stats.accuracy_rate = percentage(stats.correct_predictions, stats.labelled_tests);
    }
    for service in stats.by_service.values_mut() {
        service.accuracy_rate = percentage(service.correct_predictions, service.total_tests);
        service.average_confidence /= service.total_tests as f32;
    }

    tracing::info!(
        total = stats.total_tests,
        accuracy = stats.accuracy_rate,
        average_confidence = stats.average_confidence,
        "Batch evaluation completed"
    );

    BatchReport {
        results,
        statistics: stats,
    }
}

fn percentage(part: usize, whole: usize) -> f32 {
    part as f32 / whole as f32 * 100.0
}
