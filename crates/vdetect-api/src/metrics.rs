//! Prometheus metrics for the API server.

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, describe_counter, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    describe_metrics();
    Ok(handle)
}

fn describe_metrics() {
    describe_counter!(names::HTTP_REQUESTS_TOTAL, "HTTP requests by method, path and status");
    describe_histogram!(names::HTTP_REQUEST_DURATION_SECONDS, "HTTP request latency");
    describe_counter!(names::ANALYSES_TOTAL, "Video analyses by outcome");
    describe_histogram!(names::ANALYSIS_DURATION_SECONDS, "End-to-end analysis latency");
    describe_counter!(names::DIAGNOSTICS_RUNS_TOTAL, "Diagnostics passes by outcome");
    describe_counter!(names::MODEL_LOADS_TOTAL, "Model loads by outcome");
    describe_histogram!(names::MODEL_LOAD_DURATION_SECONDS, "Successful model load latency");
    describe_histogram!(names::INFERENCE_DURATION_SECONDS, "Classifier forward pass latency");
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "vdetect_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "vdetect_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "vdetect_http_requests_in_flight";

    // Analysis metrics
    pub const ANALYSES_TOTAL: &str = "vdetect_analyses_total";
    pub const ANALYSIS_DURATION_SECONDS: &str = "vdetect_analysis_duration_seconds";
    pub const DIAGNOSTICS_RUNS_TOTAL: &str = "vdetect_diagnostics_runs_total";

    // Recorded by the engine crate
    pub const MODEL_LOADS_TOTAL: &str = "vdetect_model_loads_total";
    pub const MODEL_LOAD_DURATION_SECONDS: &str = "vdetect_model_load_duration_seconds";
    pub const INFERENCE_DURATION_SECONDS: &str = "vdetect_inference_duration_seconds";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record one finished analysis; `outcome` is `success` or an error code.
pub fn record_analysis(outcome: &str, duration_secs: f64) {
    let labels = [("outcome", outcome.to_string())];
    counter!(names::ANALYSES_TOTAL, &labels).increment(1);
    histogram!(names::ANALYSIS_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record one diagnostics pass.
pub fn record_diagnostics_run(passed: bool) {
    let outcome = if passed { "passed" } else { "failed" };
    counter!(names::DIAGNOSTICS_RUNS_TOTAL, "outcome" => outcome).increment(1);
}

/// Collapse unknown paths so scanners can't blow up label cardinality.
fn sanitize_path(path: &str) -> String {
    match path {
        "/" | "/health" | "/healthz" | "/analyze" | "/upload" | "/debug-model" | "/metrics" => {
            path.to_string()
        }
        _ => "other".to_string(),
    }
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(sanitize_path("/analyze"), "/analyze");
        assert_eq!(sanitize_path("/debug-model"), "/debug-model");
        assert_eq!(sanitize_path("/wp-admin/setup.php"), "other");
    }
}
