//! Prometheus metrics
//!
//! Metric names:
//! - `intent_router_requests_total{endpoint, status}`
//! - `intent_router_classifications_total{source, service_id}`
//! - `intent_router_fallbacks_total{reason}`
//! - `intent_router_classification_duration_seconds{source}`
//! - `intent_router_llm_latency_seconds`
//! - `intent_router_batch_cases_total`
//! - `intent_router_batch_accuracy_rate`

use axum::http::StatusCode;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

use intent_router_classifier::{BatchStatistics, ClassifyOutcome};

static PROMETHEUS: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the global Prometheus recorder
///
/// Safe to call more than once; later calls return the existing handle.
pub fn init_metrics() -> Option<PrometheusHandle> {
    if let Some(handle) = PROMETHEUS.get() {
        return Some(handle.clone());
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(PROMETHEUS.get_or_init(|| handle).clone()),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install Prometheus recorder");
            None
        },
    }
}

/// Count a handled request
pub fn record_request(endpoint: &'static str, status: StatusCode) {
    metrics::counter!(
        "intent_router_requests_total",
        "endpoint" => endpoint,
        "status" => status.as_u16().to_string()
    )
    .increment(1);
}

/// Record the outcome of one classification
pub fn record_classification(outcome: &ClassifyOutcome) {
    let classification = &outcome.classification;
    let source = classification.source.as_str();

    metrics::counter!(
        "intent_router_classifications_total",
        "source" => source,
        "service_id" => classification.service.id.to_string()
    )
    .increment(1);

    if let Some(reason) = classification.fallback_reason() {
        metrics::counter!("intent_router_fallbacks_total", "reason" => reason.as_str())
            .increment(1);
    }

    metrics::histogram!("intent_router_classification_duration_seconds", "source" => source)
        .record(outcome.elapsed.as_secs_f64());

    if let Some(latency) = outcome.llm_latency {
        metrics::histogram!("intent_router_llm_latency_seconds").record(latency.as_secs_f64());
    }
}

/// Record a finished batch evaluation
pub fn record_batch(stats: &BatchStatistics) {
    metrics::counter!("intent_router_batch_cases_total").increment(stats.total_tests as u64);
    metrics::gauge!("intent_router_batch_accuracy_rate").set(stats.accuracy_rate as f64);
}

/// Prometheus scrape endpoint
pub async fn metrics_handler() -> (StatusCode, String) {
    match PROMETHEUS.get() {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics recorder not installed".to_string(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_request("find_service", StatusCode::OK);
        record_batch(&BatchStatistics::default());
    }
}
