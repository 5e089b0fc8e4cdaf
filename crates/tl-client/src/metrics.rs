//! Client metrics collection.
//!
//! Provides standardized metrics for monitoring API traffic:
//! - Request counters by operation and status
//! - Latency histograms
//! - Retry counters
//! - Uploaded bytes

use metrics::{counter, histogram};

/// Metric name constants for consistency.
pub mod names {
    /// Total API requests by operation and status.
    pub const REQUESTS_TOTAL: &str = "transloadit_requests_total";

    /// Total retry attempts by operation.
    pub const RETRIES_TOTAL: &str = "transloadit_retries_total";

    /// Request latency in seconds by operation.
    pub const LATENCY_SECONDS: &str = "transloadit_request_latency_seconds";

    /// Bytes sent through resumable uploads.
    pub const UPLOAD_BYTES_TOTAL: &str = "transloadit_upload_bytes_total";
}

/// Record metrics for a completed API request.
pub fn record_request(operation: &str, status: u16, latency_ms: f64) {
    counter!(
        names::REQUESTS_TOTAL,
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        names::LATENCY_SECONDS,
        "operation" => operation.to_string()
    )
    .record(latency_ms / 1000.0);
}

/// Record a retry attempt.
pub fn record_retry(operation: &str) {
    counter!(
        names::RETRIES_TOTAL,
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Record bytes accepted by the upload server.
pub fn record_uploaded_bytes(bytes: u64) {
    counter!(names::UPLOAD_BYTES_TOTAL).increment(bytes);
}
