//! Prometheus metrics for soundfacts-service.
//!
//! Recording helpers are no-ops until [`init_metrics`] has run, so library
//! code and tests can call them freely.

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::OnceLock;
use std::time::Instant;

// Global registry
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

// HTTP metrics
pub static HTTP_REQUESTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static HTTP_REQUEST_DURATION_SECONDS: OnceLock<HistogramVec> = OnceLock::new();

// Analysis metrics
pub static ANALYSIS_REQUESTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static PROVIDER_LATENCY_SECONDS: OnceLock<HistogramVec> = OnceLock::new();
pub static PROVIDER_ERRORS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static PROVIDER_TOKENS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Initialize all metrics. Must be called once at startup.
pub fn init_metrics() {
    let registry = Registry::new();

    let http_requests_total = IntCounterVec::new(
        Opts::new("http_requests_total", "Total number of HTTP requests"),
        &["method", "path", "status"],
    )
    .expect("Failed to create http_requests_total metric");

    let http_request_duration = HistogramVec::new(
        HistogramOpts::new(
            "http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        &["method", "path"],
    )
    .expect("Failed to create http_request_duration_seconds metric");

    // outcome: success, preflight, method_not_allowed, missing_fields, ...
    let analysis_requests = IntCounterVec::new(
        Opts::new(
            "soundfacts_requests_total",
            "Sound Facts requests by outcome",
        ),
        &["outcome"],
    )
    .expect("Failed to create soundfacts_requests_total metric");

    let provider_latency = HistogramVec::new(
        HistogramOpts::new(
            "soundfacts_provider_latency_seconds",
            "LLM provider API latency in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]),
        &["provider", "model"],
    )
    .expect("Failed to create soundfacts_provider_latency_seconds metric");

    let provider_errors = IntCounterVec::new(
        Opts::new(
            "soundfacts_provider_errors_total",
            "Total LLM provider errors",
        ),
        &["provider", "error_type"],
    )
    .expect("Failed to create soundfacts_provider_errors_total metric");

    let provider_tokens = IntCounterVec::new(
        Opts::new("soundfacts_tokens_total", "Total tokens processed"),
        &["model", "type"], // type: input, output
    )
    .expect("Failed to create soundfacts_tokens_total metric");

    registry
        .register(Box::new(http_requests_total.clone()))
        .expect("Failed to register http_requests_total");
    registry
        .register(Box::new(http_request_duration.clone()))
        .expect("Failed to register http_request_duration_seconds");
    registry
        .register(Box::new(analysis_requests.clone()))
        .expect("Failed to register soundfacts_requests_total");
    registry
        .register(Box::new(provider_latency.clone()))
        .expect("Failed to register soundfacts_provider_latency_seconds");
    registry
        .register(Box::new(provider_errors.clone()))
        .expect("Failed to register soundfacts_provider_errors_total");
    registry
        .register(Box::new(provider_tokens.clone()))
        .expect("Failed to register soundfacts_tokens_total");

    // Initialize globals
    let _ = REGISTRY.set(registry);
    let _ = HTTP_REQUESTS_TOTAL.set(http_requests_total);
    let _ = HTTP_REQUEST_DURATION_SECONDS.set(http_request_duration);
    let _ = ANALYSIS_REQUESTS_TOTAL.set(analysis_requests);
    let _ = PROVIDER_LATENCY_SECONDS.set(provider_latency);
    let _ = PROVIDER_ERRORS_TOTAL.set(provider_errors);
    let _ = PROVIDER_TOKENS_TOTAL.set(provider_tokens);

    tracing::info!("Prometheus metrics initialized");
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();

    let registry = match REGISTRY.get() {
        Some(r) => r,
        None => {
            tracing::error!("Metrics registry not initialized");
            return "# Metrics registry not initialized\n".to_string();
        }
    };

    let metric_families = registry.gather();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return format!("# Failed to encode metrics: {}\n", e);
    }

    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Failed to convert metrics to UTF-8");
            format!("# Failed to convert metrics to UTF-8: {}\n", e)
        }
    }
}

/// Count one request to the analysis endpoint.
pub fn record_analysis_outcome(outcome: &str) {
    if let Some(counter) = ANALYSIS_REQUESTS_TOTAL.get() {
        counter.with_label_values(&[outcome]).inc();
    }
}

/// Record provider latency.
pub fn record_provider_latency(provider: &str, model: &str, duration_secs: f64) {
    if let Some(histogram) = PROVIDER_LATENCY_SECONDS.get() {
        histogram
            .with_label_values(&[provider, model])
            .observe(duration_secs);
    }
}

/// Record a provider error.
pub fn record_provider_error(provider: &str, error_type: &str) {
    if let Some(counter) = PROVIDER_ERRORS_TOTAL.get() {
        counter.with_label_values(&[provider, error_type]).inc();
    }
}

/// Record token usage reported by the provider.
pub fn record_tokens(model: &str, input_tokens: u32, output_tokens: u32) {
    if let Some(counter) = PROVIDER_TOKENS_TOTAL.get() {
        counter
            .with_label_values(&[model, "input"])
            .inc_by(u64::from(input_tokens));
        counter
            .with_label_values(&[model, "output"])
            .inc_by(u64::from(output_tokens));
    }
}

/// Axum middleware recording request count and latency per route.
///
/// Unmatched paths share one label to keep cardinality bounded.
pub async fn http_metrics_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(req).await;

    let status = response.status().as_u16().to_string();
    if let Some(counter) = HTTP_REQUESTS_TOTAL.get() {
        counter
            .with_label_values(&[method.as_str(), path.as_str(), status.as_str()])
            .inc();
    }
    if let Some(histogram) = HTTP_REQUEST_DURATION_SECONDS.get() {
        histogram
            .with_label_values(&[method.as_str(), path.as_str()])
            .observe(start.elapsed().as_secs_f64());
    }

    response
}
