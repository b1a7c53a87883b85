//! Prometheus metrics
//!
//! Counters and histograms are recorded through the `metrics` facade across
//! the workspace; this module installs the Prometheus recorder and renders it.

use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

use crate::ServerError;

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Latency buckets in seconds for knowledge queries and answer delivery
const LATENCY_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0];

/// Call duration buckets in seconds
const CALL_BUCKETS: &[f64] = &[10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0];

/// Install the global Prometheus recorder
///
/// Installs once per process; later calls return the same handle.
pub fn init_metrics() -> Result<PrometheusHandle, ServerError> {
    HANDLE
        .get_or_try_init(|| {
            PrometheusBuilder::new()
                .set_buckets_for_metric(
                    Matcher::Suffix("_seconds".to_string()),
                    LATENCY_BUCKETS,
                )
                .and_then(|b| {
                    b.set_buckets_for_metric(
                        Matcher::Full("call_bridge_call_duration_seconds".to_string()),
                        CALL_BUCKETS,
                    )
                })
                .map_err(|e| ServerError::Internal(format!("Invalid metric buckets: {}", e)))?
                .install_recorder()
                .map_err(|e| ServerError::Internal(format!("Failed to install metrics recorder: {}", e)))
        })
        .cloned()
}

/// `GET /metrics`
pub async fn metrics_handler() -> impl IntoResponse {
    match HANDLE.get() {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            "metrics disabled\n".to_string(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let _first = init_metrics().unwrap();
        ::metrics::counter!("call_bridge_test_total").increment(2);
        let second = init_metrics().unwrap();

        assert!(second.render().contains("call_bridge_test_total 2"));
    }
}
