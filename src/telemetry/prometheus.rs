// Copyright 2024-2026 Veritas SPARK Contributors
// SPDX-License-Identifier: Apache-2.0

//! Prometheus text format exporter.
//!
//! Format spec: https://prometheus.io/docs/instrumenting/exposition_formats/

use std::fmt::Write;

use super::buckets::BucketedHistogramSnapshot;
use super::store::MetricsSnapshot;

pub struct MetricHelp {
    pub name: &'static str,
    pub help: &'static str,
    pub metric_type: &'static str,
}

pub const METRIC_DEFINITIONS: &[MetricHelp] = &[
    MetricHelp { name: "proxy_requests_total", help: "Total proxied inference requests", metric_type: "counter" },
    MetricHelp { name: "proxy_requests_success", help: "Successful proxied requests", metric_type: "counter" },
    MetricHelp { name: "proxy_requests_failed", help: "Failed proxied requests", metric_type: "counter" },
    MetricHelp { name: "proxy_admission_rejections_total", help: "Requests rejected before a backend call was made", metric_type: "counter" },
    MetricHelp { name: "proxy_evictions_total", help: "Models evicted to admit another model", metric_type: "counter" },
    MetricHelp { name: "proxy_active_requests", help: "Currently in-flight proxied requests", metric_type: "gauge" },
    MetricHelp { name: "proxy_gpu_free_mb", help: "GPU memory free at last poll, in megabytes", metric_type: "gauge" },
    MetricHelp { name: "proxy_backend_start_latency_seconds", help: "Backend spawn-to-ready latency", metric_type: "histogram" },
    MetricHelp { name: "proxy_request_latency_ms", help: "End-to-end proxied request latency", metric_type: "histogram" },
];

pub fn encode_prometheus(snapshot: &MetricsSnapshot) -> String {
    let mut output = String::with_capacity(4096);

    for (name, value) in &snapshot.counters {
        write_metric_header(&mut output, name);
        writeln!(output, "{name} {value}").unwrap();
    }

    for (name, value) in &snapshot.gauges {
        write_metric_header(&mut output, name);
        writeln!(output, "{name} {value}").unwrap();
    }

    for (name, snap) in &snapshot.bucketed_histograms {
        output.push_str(&encode_bucketed_histogram(name, snap));
    }

    output
}

pub fn encode_bucketed_histogram(name: &str, snap: &BucketedHistogramSnapshot) -> String {
    let mut output = String::with_capacity(512);

    write_metric_header(&mut output, name);

    let mut cumulative = 0u64;
    for (i, &boundary) in snap.boundaries.iter().enumerate() {
        cumulative += snap.bucket_counts[i];
        writeln!(output, "{name}_bucket{{le=\"{boundary}\"}} {cumulative}").unwrap();
    }

    cumulative += snap.bucket_counts.last().copied().unwrap_or(0);
    writeln!(output, "{name}_bucket{{le=\"+Inf\"}} {cumulative}").unwrap();

    writeln!(output, "{name}_count {}", snap.count).unwrap();
    writeln!(output, "{name}_sum {}", snap.sum).unwrap();

    output
}

fn write_metric_header(output: &mut String, name: &str) {
    if let Some(def) = METRIC_DEFINITIONS.iter().find(|d| d.name == name) {
        writeln!(output, "# HELP {name} {}", def.help).unwrap();
        writeln!(output, "# TYPE {name} {}", def.metric_type).unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn encode_counter_includes_help_and_type() {
        let mut snapshot = MetricsSnapshot {
            counters: HashMap::new(),
            gauges: HashMap::new(),
            histograms: HashMap::new(),
            bucketed_histograms: HashMap::new(),
        };
        snapshot.counters.insert("proxy_requests_total".to_string(), 42);

        let output = encode_prometheus(&snapshot);
        assert!(output.contains("# HELP proxy_requests_total"));
        assert!(output.contains("# TYPE proxy_requests_total counter"));
        assert!(output.contains("proxy_requests_total 42"));
    }

    #[test]
    fn encode_bucketed_histogram_is_cumulative() {
        let snap = BucketedHistogramSnapshot {
            boundaries: vec![1.0, 5.0, 10.0],
            bucket_counts: vec![2, 3, 1, 1],
            count: 7,
            sum: 25.5,
        };

        let output = encode_bucketed_histogram("test_latency", &snap);
        assert!(output.contains("test_latency_bucket{le=\"1\"} 2"));
        assert!(output.contains("test_latency_bucket{le=\"5\"} 5"));
        assert!(output.contains("test_latency_bucket{le=\"+Inf\"} 7"));
    }
}
