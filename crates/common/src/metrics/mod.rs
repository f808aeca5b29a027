//! Metrics and observability utilities
//!
//! Provides Prometheus metrics with SLO-aligned histograms
//! and standardized naming conventions.

use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};
use std::time::Instant;

/// Metrics prefix for all ExpertScope metrics
pub const METRICS_PREFIX: &str = "expertscope";

/// SLO-aligned histogram buckets for request latency (in seconds)
/// Targets: P50 < 50ms, P99 < 250ms
pub const LATENCY_BUCKETS: &[f64] = &[
    0.001, // 1ms
    0.005, // 5ms
    0.010, // 10ms
    0.025, // 25ms
    0.050, // 50ms - P50 target
    0.075, // 75ms
    0.100, // 100ms
    0.150, // 150ms
    0.250, // 250ms - P99 target
    0.500, // 500ms
    1.000, // 1s
    2.500, // 2.5s
    5.000, // 5s
    10.00, // 10s
];

/// Buckets for embedding and LLM latency (typically slower)
pub const BACKEND_BUCKETS: &[f64] = &[
    0.050, // 50ms
    0.100, // 100ms
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.000, // 2s
    5.000, // 5s
    10.00, // 10s
    30.00, // 30s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Pipeline metrics
    describe_counter!(
        format!("{}_pipeline_queries_total", METRICS_PREFIX),
        Unit::Count,
        "Total queries per discovery pipeline"
    );

    describe_histogram!(
        format!("{}_pipeline_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Discovery pipeline latency in seconds"
    );

    describe_gauge!(
        format!("{}_pipeline_results_count", METRICS_PREFIX),
        Unit::Count,
        "Number of results returned from the last pipeline run"
    );

    describe_counter!(
        format!("{}_redacted_rows_total", METRICS_PREFIX),
        Unit::Count,
        "Total chunk rows hidden by clearance"
    );

    // Embedding metrics
    describe_counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding backend requests"
    );

    describe_histogram!(
        format!("{}_embedding_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Embedding generation latency in seconds"
    );

    describe_counter!(
        format!("{}_embedding_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding backend errors"
    );

    // Answer metrics
    describe_counter!(
        format!("{}_answers_total", METRICS_PREFIX),
        Unit::Count,
        "Total answers generated, labeled by mode"
    );

    describe_histogram!(
        format!("{}_answer_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Answer synthesis latency in seconds"
    );

    // Live fetch metrics
    describe_counter!(
        format!("{}_live_fetch_runs_total", METRICS_PREFIX),
        Unit::Count,
        "Live fetch gate outcomes, labeled by reason"
    );

    describe_histogram!(
        format!("{}_live_fetch_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Live fetch run latency in seconds"
    );

    describe_counter!(
        format!("{}_papers_upserted_total", METRICS_PREFIX),
        Unit::Count,
        "Total papers created or refreshed by live fetch"
    );

    // Audit metrics
    describe_counter!(
        format!("{}_audit_failures_total", METRICS_PREFIX),
        Unit::Count,
        "Audit rows dropped after a write failure"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Helper to record pipeline metrics
pub fn record_pipeline(
    pipeline: &str,
    duration_secs: f64,
    result_count: usize,
    redacted_count: usize,
) {
    counter!(
        format!("{}_pipeline_queries_total", METRICS_PREFIX),
        "pipeline" => pipeline.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_pipeline_duration_seconds", METRICS_PREFIX),
        "pipeline" => pipeline.to_string()
    )
    .record(duration_secs);

    gauge!(
        format!("{}_pipeline_results_count", METRICS_PREFIX),
        "pipeline" => pipeline.to_string()
    )
    .set(result_count as f64);

    if redacted_count > 0 {
        counter!(
            format!("{}_redacted_rows_total", METRICS_PREFIX),
            "pipeline" => pipeline.to_string()
        )
        .increment(redacted_count as u64);
    }
}

/// Helper to record embedding metrics
pub fn record_embedding(duration_secs: f64, model: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_embedding_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);
    } else {
        counter!(
            format!("{}_embedding_errors_total", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .increment(1);
    }
}

/// Helper to record answer synthesis metrics
pub fn record_answer(mode: &str, duration_secs: f64) {
    counter!(
        format!("{}_answers_total", METRICS_PREFIX),
        "mode" => mode.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_answer_duration_seconds", METRICS_PREFIX),
        "mode" => mode.to_string()
    )
    .record(duration_secs);
}

/// Helper to record live fetch outcomes
pub fn record_live_fetch(reason: &str, duration_secs: f64, papers_touched: usize) {
    counter!(
        format!("{}_live_fetch_runs_total", METRICS_PREFIX),
        "reason" => reason.to_string()
    )
    .increment(1);

    histogram!(format!("{}_live_fetch_duration_seconds", METRICS_PREFIX)).record(duration_secs);

    if papers_touched > 0 {
        counter!(format!("{}_papers_upserted_total", METRICS_PREFIX))
            .increment(papers_touched as u64);
    }
}

/// Helper to record a dropped audit row
pub fn record_audit_failure(endpoint: &str) {
    counter!(
        format!("{}_audit_failures_total", METRICS_PREFIX),
        "endpoint" => endpoint.to_string()
    )
    .increment(1);
}
