// Prometheus metrics for action validation and execution
//
// Collected into a private registry; `gather_metrics()` renders the text
// exposition format for whatever scraper the host provides:
// - Validation decisions by status (counter) and latency (histogram)
// - Rate-limit denials and fail-closed conversions (counters)
// - Executions by status (counter) and duration (histogram)
// - Audit appends, append failures and monitor anomalies (counters)

use lazy_static::lazy_static;
use prometheus::{Encoder, Histogram, HistogramVec, IntCounter, IntCounterVec, Registry, TextEncoder};
use std::sync::Arc;

lazy_static! {
    pub static ref REGISTRY: Arc<Registry> = Arc::new(Registry::new());

    // Validation metrics
    pub static ref VALIDATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("validations_total", "Total number of validation decisions"),
        &["status"]
    ).expect("Failed to create validations total metric");

    pub static ref VALIDATION_DURATION_SECONDS: Histogram = Histogram::with_opts(
        prometheus::HistogramOpts::new("validation_duration_seconds", "Validation pipeline duration in seconds")
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
    ).expect("Failed to create validation duration metric");

    pub static ref RATE_LIMITED_TOTAL: IntCounter = IntCounter::new(
        "rate_limited_total",
        "Total number of actions blocked by the per-agent rate limit"
    ).expect("Failed to create rate limited metric");

    pub static ref FAIL_CLOSED_TOTAL: IntCounter = IntCounter::new(
        "fail_closed_total",
        "Total number of validations rejected because of an internal error"
    ).expect("Failed to create fail closed metric");

    // Execution metrics
    pub static ref EXECUTIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("executions_total", "Total number of secured executions by outcome"),
        &["status"]
    ).expect("Failed to create executions total metric");

    pub static ref EXECUTION_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        prometheus::HistogramOpts::new("execution_duration_seconds", "Action execution duration in seconds"),
        &["status"]
    ).expect("Failed to create execution duration metric");

    // Audit metrics
    pub static ref AUDIT_RECORDS_TOTAL: IntCounter = IntCounter::new(
        "audit_records_total",
        "Total number of audit records appended"
    ).expect("Failed to create audit records metric");

    pub static ref AUDIT_APPEND_FAILURES_TOTAL: IntCounter = IntCounter::new(
        "audit_append_failures_total",
        "Total number of failed audit appends"
    ).expect("Failed to create audit append failures metric");

    pub static ref MONITOR_ANOMALIES_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("monitor_anomalies_total", "Anomalies raised while monitoring executions"),
        &["anomaly"]
    ).expect("Failed to create monitor anomalies metric");
}

/// Register all metrics with the registry - call once at startup
pub fn init() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(VALIDATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(VALIDATION_DURATION_SECONDS.clone()))?;
    REGISTRY.register(Box::new(RATE_LIMITED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(FAIL_CLOSED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(EXECUTIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(EXECUTION_DURATION_SECONDS.clone()))?;
    REGISTRY.register(Box::new(AUDIT_RECORDS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(AUDIT_APPEND_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(MONITOR_ANOMALIES_TOTAL.clone()))?;
    Ok(())
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))?;
    String::from_utf8(buffer).map_err(|e| anyhow::anyhow!("Invalid UTF-8 in metrics: {}", e))
}
