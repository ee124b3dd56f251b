//! Metric definitions for the proxy.
//!
//! Uses the `metrics` facade for describe/record calls (as the teacher does)
//! plus a direct write into `MetricsStore` so `/metrics` has values to
//! render without a registered recorder crate.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

use super::store::MetricsStore;

pub fn init_metrics() {
    describe_counter!("proxy_requests_total", "Total proxied inference requests");
    describe_counter!("proxy_requests_success", "Successful proxied requests");
    describe_counter!("proxy_requests_failed", "Failed proxied requests");
    describe_counter!(
        "proxy_admission_rejections_total",
        "Requests rejected by the admission planner before a backend call was made"
    );
    describe_counter!("proxy_evictions_total", "Models evicted to admit another model");
    describe_gauge!("proxy_active_requests", "Currently in-flight proxied requests");
    describe_gauge!("proxy_gpu_free_mb", "GPU memory free at last poll, in megabytes");
    describe_histogram!(
        "proxy_backend_start_latency_seconds",
        "Time from backend spawn to first healthy readiness probe"
    );
    describe_histogram!(
        "proxy_request_latency_ms",
        "End-to-end proxied request latency in milliseconds"
    );
}

pub fn record_request_success(store: &MetricsStore, model: &str, latency_ms: u64) {
    counter!("proxy_requests_total", "model" => model.to_string()).increment(1);
    counter!("proxy_requests_success", "model" => model.to_string()).increment(1);
    histogram!("proxy_request_latency_ms", "model" => model.to_string()).record(latency_ms as f64);
    store.incr_counter("proxy_requests_total", 1);
    store.incr_counter("proxy_requests_success", 1);
    store.observe_histogram("proxy_request_latency_ms", latency_ms as f64);
}

pub fn record_request_failure(store: &MetricsStore, model: &str, reason: &str) {
    counter!("proxy_requests_total", "model" => model.to_string()).increment(1);
    counter!(
        "proxy_requests_failed",
        "model" => model.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
    store.incr_counter("proxy_requests_total", 1);
    store.incr_counter("proxy_requests_failed", 1);
}

pub fn record_admission_rejection(store: &MetricsStore, model: &str) {
    counter!("proxy_requests_total", "model" => model.to_string()).increment(1);
    counter!("proxy_admission_rejections_total", "model" => model.to_string()).increment(1);
    store.incr_counter("proxy_requests_total", 1);
    store.incr_counter("proxy_admission_rejections_total", 1);
}

pub fn record_eviction(store: &MetricsStore, model: &str) {
    counter!("proxy_evictions_total", "model" => model.to_string()).increment(1);
    store.incr_counter("proxy_evictions_total", 1);
}

pub fn record_backend_start_latency(store: &MetricsStore, model: &str, latency_secs: f64) {
    histogram!("proxy_backend_start_latency_seconds", "model" => model.to_string())
        .record(latency_secs);
    store.observe_histogram("proxy_backend_start_latency_seconds", latency_secs);
}

pub fn record_active_requests(store: &MetricsStore, count: usize) {
    gauge!("proxy_active_requests").set(count as f64);
    store.set_gauge("proxy_active_requests", count as f64);
}

pub fn record_gpu_free_mb(store: &MetricsStore, free_mb: u64) {
    gauge!("proxy_gpu_free_mb").set(free_mb as f64);
    store.set_gauge("proxy_gpu_free_mb", free_mb as f64);
}
