//! Metrics and observability utilities
//!
//! Prometheus metrics with standardized `mailscout_` naming. Recording is a
//! no-op until a recorder is installed (the gateway installs the Prometheus
//! exporter).

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all MailScout metrics
pub const METRICS_PREFIX: &str = "mailscout";

/// Histogram buckets for HTTP request latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.001,  // 1ms
    0.005,  // 5ms
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
];

/// Buckets for outbound lookup latency (third-party API, slower)
pub const LOOKUP_BUCKETS: &[f64] = &[
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.000,  // 2s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
];

/// Register all metric descriptions
pub fn register_metrics() {
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

    describe_counter!(
        format!("{}_lookups_total", METRICS_PREFIX),
        Unit::Count,
        "Email lookups by outcome"
    );

    describe_histogram!(
        format!("{}_lookup_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Email lookup latency in seconds"
    );

    describe_counter!(
        format!("{}_batches_submitted_total", METRICS_PREFIX),
        Unit::Count,
        "Batch jobs accepted"
    );

    describe_counter!(
        format!("{}_batches_completed_total", METRICS_PREFIX),
        Unit::Count,
        "Batch jobs that reached completion"
    );

    describe_counter!(
        format!("{}_batch_contacts_processed_total", METRICS_PREFIX),
        Unit::Count,
        "Batch contacts processed, by record status"
    );

    describe_counter!(
        format!("{}_batches_unrecorded_total", METRICS_PREFIX),
        Unit::Count,
        "Batch jobs whose completion could not be persisted"
    );

    describe_gauge!(
        format!("{}_batches_running", METRICS_PREFIX),
        Unit::Count,
        "Batch jobs currently being processed"
    );

    describe_histogram!(
        format!("{}_batch_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Wall time from batch start to completion"
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

/// Record one outbound lookup
pub fn record_lookup(duration_secs: f64, outcome: &'static str) {
    counter!(
        format!("{}_lookups_total", METRICS_PREFIX),
        "outcome" => outcome
    )
    .increment(1);

    histogram!(format!("{}_lookup_duration_seconds", METRICS_PREFIX)).record(duration_secs);
}

/// Record a batch entering processing
pub fn record_batch_started(contacts: usize) {
    counter!(format!("{}_batches_submitted_total", METRICS_PREFIX)).increment(1);
    gauge!(format!("{}_batches_running", METRICS_PREFIX)).increment(1.0);
    tracing::debug!(contacts, "Batch metrics started");
}

/// Record one processed batch contact
pub fn record_batch_contact(status: &'static str) {
    counter!(
        format!("{}_batch_contacts_processed_total", METRICS_PREFIX),
        "status" => status
    )
    .increment(1);
}

/// Record a batch leaving processing. Only batches whose completion was
/// persisted count as completed.
pub fn record_batch_finished(duration_secs: f64, completion_recorded: bool) {
    if completion_recorded {
        counter!(format!("{}_batches_completed_total", METRICS_PREFIX)).increment(1);
    } else {
        counter!(format!("{}_batches_unrecorded_total", METRICS_PREFIX)).increment(1);
    }
    gauge!(format!("{}_batches_running", METRICS_PREFIX)).decrement(1.0);
    histogram!(format!("{}_batch_duration_seconds", METRICS_PREFIX)).record(duration_secs);
}
