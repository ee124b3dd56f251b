//! Telemetry: structured logging, metrics facade, and the Prometheus
//! text exporter backing `/metrics`.

pub mod buckets;
mod logging;
mod metrics;
pub mod prometheus;
mod store;

pub use buckets::{BucketedHistogram, BucketedHistogramSnapshot};
pub use logging::{init_logging, LogError};
pub use metrics::{
    init_metrics, record_active_requests, record_admission_rejection,
    record_backend_start_latency, record_eviction, record_gpu_free_mb, record_request_failure,
    record_request_success,
};
pub use prometheus::{encode_bucketed_histogram, encode_prometheus};
pub use store::{HistogramSummary, MetricsSnapshot, MetricsStore};
