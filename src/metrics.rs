//! Prometheus metrics for obsbench.
//!
//! Installs a global Prometheus recorder using `metrics-exporter-prometheus`,
//! defines metric name constants and the helper the client facade calls
//! after every storage operation.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;

use crate::protocol::ObsStatus;

// -- Metric name constants ----------------------------------------------------

/// Total storage operations (counter). Labels: operation, status.
pub const OPERATIONS_TOTAL: &str = "obsbench_operations_total";

/// Storage operation duration in seconds (histogram). Labels: operation.
pub const OPERATION_DURATION_SECONDS: &str = "obsbench_operation_duration_seconds";

/// Total payload bytes uploaded by put and append (counter).
pub const BYTES_SENT_TOTAL: &str = "obsbench_bytes_sent_total";

/// Total keys removed by bulk deletes (counter).
pub const KEYS_DELETED_TOTAL: &str = "obsbench_keys_deleted_total";

// -- Global recorder installation ---------------------------------------------

/// Singleton handle to the Prometheus recorder.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus metrics recorder. Idempotent -- safe to call
/// multiple times. Returns a reference to the global handle.
pub fn init_metrics() -> &'static PrometheusHandle {
    PROMETHEUS_HANDLE.get_or_init(|| {
        PrometheusBuilder::new()
            .install_recorder()
            .expect("failed to install Prometheus recorder")
    })
}

/// Register metric descriptions with the global recorder. Call once after
/// `init_metrics()`.
pub fn describe_metrics() {
    describe_counter!(OPERATIONS_TOTAL, "Total storage operations by type and status");
    describe_histogram!(
        OPERATION_DURATION_SECONDS,
        "Storage operation duration in seconds"
    );
    describe_counter!(BYTES_SENT_TOTAL, "Total payload bytes uploaded");
    describe_counter!(KEYS_DELETED_TOTAL, "Total keys removed by bulk deletes");
}

/// Prometheus exposition text, or `None` when no recorder was installed.
pub fn render() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|handle| handle.render())
}

// -- Recording helpers --------------------------------------------------------

/// Record one finished operation. Without an installed recorder this is a
/// no-op.
pub fn record_operation(operation: &'static str, status: ObsStatus, elapsed: Duration) {
    counter!(OPERATIONS_TOTAL, "operation" => operation, "status" => status.name()).increment(1);
    histogram!(OPERATION_DURATION_SECONDS, "operation" => operation).record(elapsed.as_secs_f64());
}

/// Record uploaded payload bytes.
pub fn record_bytes_sent(bytes: u64) {
    counter!(BYTES_SENT_TOTAL).increment(bytes);
}

/// Record keys removed by a bulk delete.
pub fn record_keys_deleted(count: u64) {
    counter!(KEYS_DELETED_TOTAL).increment(count);
}
