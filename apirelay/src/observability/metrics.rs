//! Prometheus metrics for the HTTP surface, the config store and relay calls

use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, HistogramVec, IntGauge, TextEncoder, register_counter_vec,
    register_histogram_vec, register_int_gauge,
};
use std::time::Instant;

lazy_static! {
    /// Completed API requests by route and status
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "apirelay_http_requests_total",
        "Completed HTTP requests",
        &["method", "route", "status"]
    )
    .unwrap();

    pub static ref HTTP_REQUEST_DURATION: HistogramVec = register_histogram_vec!(
        "apirelay_http_request_duration_seconds",
        "HTTP request latency, including any relay call",
        &["method", "route"],
        vec![0.001, 0.005, 0.025, 0.1, 0.25, 1.0, 2.5, 10.0, 30.0, 60.0]
    )
    .unwrap();

    /// Requests currently being handled
    pub static ref HTTP_REQUESTS_IN_FLIGHT: IntGauge = register_int_gauge!(
        "apirelay_http_requests_in_flight",
        "HTTP requests currently being handled"
    )
    .unwrap();

    /// Accepted TCP connections not yet closed
    pub static ref OPEN_CONNECTIONS: IntGauge = register_int_gauge!(
        "apirelay_open_connections",
        "Client connections currently open"
    )
    .unwrap();

    /// Config store operations by result
    pub static ref STORE_OPERATIONS_TOTAL: CounterVec = register_counter_vec!(
        "apirelay_store_operations_total",
        "Config store operations",
        &["operation", "result"]
    )
    .unwrap();

    pub static ref STORE_OPERATION_DURATION: HistogramVec = register_histogram_vec!(
        "apirelay_store_operation_duration_seconds",
        "Config store operation latency",
        &["operation"],
        vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]
    )
    .unwrap();

    /// Outbound relay calls by method and result
    pub static ref RELAY_CALLS_TOTAL: CounterVec = register_counter_vec!(
        "apirelay_relay_calls_total",
        "Outbound relay calls",
        &["method", "result"]
    )
    .unwrap();

    pub static ref RELAY_CALL_DURATION: HistogramVec = register_histogram_vec!(
        "apirelay_relay_call_duration_seconds",
        "Outbound relay call latency",
        &["method"],
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    )
    .unwrap();

    pub static ref WORKER_THREADS: IntGauge = register_int_gauge!(
        "apirelay_worker_threads",
        "Number of runtime worker threads"
    )
    .unwrap();
}

fn result_label(ok: bool) -> &'static str {
    if ok { "ok" } else { "error" }
}

/// One API request; counts as in flight until dropped
pub struct RequestMetrics {
    method: String,
    route: String,
    start: Instant,
}

impl RequestMetrics {
    pub fn new(method: impl Into<String>, route: impl Into<String>) -> Self {
        HTTP_REQUESTS_IN_FLIGHT.inc();
        Self {
            method: method.into(),
            route: route.into(),
            start: Instant::now(),
        }
    }

    pub fn record(self, status: u16) {
        let status = status.to_string();
        HTTP_REQUESTS_TOTAL
            .with_label_values(&[self.method.as_str(), self.route.as_str(), status.as_str()])
            .inc();
        HTTP_REQUEST_DURATION
            .with_label_values(&[self.method.as_str(), self.route.as_str()])
            .observe(self.start.elapsed().as_secs_f64());
    }
}

impl Drop for RequestMetrics {
    fn drop(&mut self) {
        HTTP_REQUESTS_IN_FLIGHT.dec();
    }
}

/// Held by a connection task for as long as the client stays connected
pub struct ConnectionGuard(());

impl ConnectionGuard {
    pub fn open() -> Self {
        OPEN_CONNECTIONS.inc();
        Self(())
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        OPEN_CONNECTIONS.dec();
    }
}

/// Times a single config-store operation
pub struct StoreMetrics {
    operation: &'static str,
    start: Instant,
}

impl StoreMetrics {
    pub fn start(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }

    pub fn finish(self, ok: bool) {
        STORE_OPERATIONS_TOTAL
            .with_label_values(&[self.operation, result_label(ok)])
            .inc();
        STORE_OPERATION_DURATION
            .with_label_values(&[self.operation])
            .observe(self.start.elapsed().as_secs_f64());
    }
}

/// Times one outbound call to a remote API
pub struct RelayMetrics {
    method: String,
    start: Instant,
}

impl RelayMetrics {
    pub fn start(method: &str) -> Self {
        Self {
            method: method.to_string(),
            start: Instant::now(),
        }
    }

    pub fn finish(self, ok: bool) {
        RELAY_CALLS_TOTAL
            .with_label_values(&[self.method.as_str(), result_label(ok)])
            .inc();
        RELAY_CALL_DURATION
            .with_label_values(&[self.method.as_str()])
            .observe(self.start.elapsed().as_secs_f64());
    }
}

/// Export metrics in Prometheus text format
pub fn export_metrics() -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

pub fn init_metrics(worker_threads: usize) {
    WORKER_THREADS.set(worker_threads as i64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exported_text_contains_recorded_series() {
        RequestMetrics::new("GET", "/api/list").record(200);
        StoreMetrics::start("select").finish(true);
        RelayMetrics::start("POST").finish(false);

        let text = export_metrics().unwrap();
        assert!(text.contains("apirelay_http_requests_total"));
        assert!(text.contains("apirelay_store_operations_total"));
        assert!(text.contains("apirelay_relay_calls_total"));
        assert!(text.contains("apirelay_relay_call_duration_seconds"));
    }

    #[test]
    fn connection_guard_tracks_open_connections() {
        let before = OPEN_CONNECTIONS.get();
        let guard = ConnectionGuard::open();
        assert_eq!(OPEN_CONNECTIONS.get(), before + 1);
        drop(guard);
        assert_eq!(OPEN_CONNECTIONS.get(), before);
    }
}
