//! Prometheus metrics for shop-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};

/// Completed mutations by operation and outcome.
pub static OPERATIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "shop_operations_total",
        "Total number of core operations by outcome",
        &["operation", "outcome"] // ok, error
    )
    .expect("Failed to register operations_total")
});

/// Creates answered from the idempotency table instead of being re-executed.
pub static IDEMPOTENT_REPLAYS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "shop_idempotent_replays_total",
        "Total number of replayed creates by entity type",
        &["entity_type"]
    )
    .expect("Failed to register idempotent_replays_total")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "shop_errors_total",
        "Total number of errors by type",
        &["error_type"]
    )
    .expect("Failed to register errors_total")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "shop_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Count an operation's outcome, and its error type on failure.
pub fn record_outcome<T>(operation: &str, result: &Result<T, crate::error::CoreError>) {
    match result {
        Ok(_) => OPERATIONS_TOTAL
            .with_label_values(&[operation, "ok"])
            .inc(),
        Err(e) => {
            OPERATIONS_TOTAL
                .with_label_values(&[operation, "error"])
                .inc();
            ERRORS_TOTAL.with_label_values(&[e.error_type()]).inc();
        }
    }
}

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&OPERATIONS_TOTAL);
    Lazy::force(&IDEMPOTENT_REPLAYS_TOTAL);
    Lazy::force(&ERRORS_TOTAL);
    Lazy::force(&DB_QUERY_DURATION);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
