//! Prometheus Metrics
//!
//! Process-wide metrics in the default registry, exposed by the ops server
//! at `/metrics`.

use once_cell::sync::Lazy;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, Encoder, IntCounter,
    IntCounterVec, IntGauge, TextEncoder,
};

use crate::error::{Error, Result};

/// Store operations by operation and outcome
pub static OPERATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "txn_store_operations_total",
        "Total number of store operations",
        &["operation", "outcome"]
    )
    .expect("txn_store_operations_total registers once")
});

/// Admission refusals by reason
pub static ADMISSION_REJECTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "txn_store_admission_rejections_total",
        "Total number of operations refused admission",
        &["reason"]
    )
    .expect("txn_store_admission_rejections_total registers once")
});

/// Operations currently holding an admission permit
pub static INFLIGHT_OPERATIONS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "txn_store_inflight_operations",
        "Number of admitted operations currently executing"
    )
    .expect("txn_store_inflight_operations registers once")
});

/// Records in the store after the last write
pub static RECORDS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("txn_store_records", "Number of stored transactions")
        .expect("txn_store_records registers once")
});

/// Page cache lookups by result
pub static PAGE_CACHE_LOOKUPS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "txn_store_page_cache_lookups_total",
        "Total number of page cache lookups",
        &["result"]
    )
    .expect("txn_store_page_cache_lookups_total registers once")
});

/// Whole-cache invalidations
pub static PAGE_CACHE_INVALIDATIONS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "txn_store_page_cache_invalidations_total",
        "Total number of page cache invalidations"
    )
    .expect("txn_store_page_cache_invalidations_total registers once")
});

fn error_outcome(error: &Error) -> &'static str {
    match error {
        Error::Validation(_) | Error::InvalidRequest(_) => "invalid",
        Error::Overloaded { .. } => "overloaded",
        _ => "error",
    }
}

/// Count a failed operation
pub fn record_outcome(operation: &str, error: &Error) {
    OPERATIONS
        .with_label_values(&[operation, error_outcome(error)])
        .inc();
}

/// Count an operation that either succeeds or fails
pub fn record_result<T>(operation: &str, result: &Result<T>) {
    match result {
        Ok(_) => OPERATIONS.with_label_values(&[operation, "ok"]).inc(),
        Err(e) => record_outcome(operation, e),
    }
}

/// Count an operation whose success may be "not found"
pub fn record_found<T>(operation: &str, result: &Result<Option<T>>) {
    match result {
        Ok(Some(_)) => OPERATIONS.with_label_values(&[operation, "ok"]).inc(),
        Ok(None) => OPERATIONS
            .with_label_values(&[operation, "not_found"])
            .inc(),
        Err(e) => record_outcome(operation, e),
    }
}

/// Encode every registered metric in the text exposition format
pub fn gather_text() -> Result<(Vec<u8>, String)> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| Error::Internal(format!("Failed to encode metrics: {}", e)))?;
    Ok((buffer, encoder.format_type().to_string()))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_found_labels() {
        let before = OPERATIONS
            .with_label_values(&["metrics-test", "not_found"])
            .get();
        record_found::<()>("metrics-test", &Ok(None));
        assert_eq!(
            OPERATIONS
                .with_label_values(&["metrics-test", "not_found"])
                .get(),
            before + 1
        );
    }

    #[test]
    fn test_gather_text_contains_store_metrics() {
        record_result("metrics-gather", &Ok::<_, Error>(()));
        let (body, content_type) = gather_text().unwrap();
        let text = String::from_utf8(body).unwrap();
        assert!(text.contains("txn_store_operations_total"));
        assert!(content_type.starts_with("text/plain"));
    }
}
