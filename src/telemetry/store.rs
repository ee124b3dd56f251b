//! In-process metrics store backing the `/metrics` exporter.
//!
//! The `metrics` crate facade used by `telemetry::metrics` is write-only —
//! it has no registered recorder here, since this proxy doesn't pull in an
//! exporter crate (same choice the teacher made). `MetricsStore` is the
//! read side: call sites update it directly alongside the facade macros so
//! `/metrics` has something to serialize.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use super::buckets::{BucketedHistogram, BucketedHistogramSnapshot};

#[derive(Debug, Clone, Default)]
pub struct HistogramSummary {
    pub count: u64,
    pub sum: f64,
}

#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub counters: HashMap<String, u64>,
    pub gauges: HashMap<String, f64>,
    pub histograms: HashMap<String, HistogramSummary>,
    pub bucketed_histograms: HashMap<String, BucketedHistogramSnapshot>,
}

pub struct MetricsStore {
    counters: RwLock<HashMap<String, AtomicU64>>,
    gauges: RwLock<HashMap<String, AtomicU64>>, // f64 bits
    histograms: RwLock<HashMap<String, BucketedHistogram>>,
}

impl MetricsStore {
    pub fn new() -> Self {
        Self {
            counters: RwLock::new(HashMap::new()),
            gauges: RwLock::new(HashMap::new()),
            histograms: RwLock::new(HashMap::new()),
        }
    }

    pub fn incr_counter(&self, name: &str, delta: u64) {
        if let Some(existing) = self.counters.read().get(name) {
            existing.fetch_add(delta, Ordering::Relaxed);
            return;
        }
        self.counters
            .write()
            .entry(name.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(delta, Ordering::Relaxed);
    }

    pub fn set_gauge(&self, name: &str, value: f64) {
        let bits = value.to_bits();
        if let Some(existing) = self.gauges.read().get(name) {
            existing.store(bits, Ordering::Relaxed);
            return;
        }
        self.gauges
            .write()
            .entry(name.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .store(bits, Ordering::Relaxed);
    }

    pub fn observe_histogram(&self, name: &str, value: f64) {
        if let Some(existing) = self.histograms.read().get(name) {
            existing.observe(value);
            return;
        }
        self.histograms
            .write()
            .entry(name.to_string())
            .or_insert_with(BucketedHistogram::latency)
            .observe(value);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let counters = self
            .counters
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.load(Ordering::Relaxed)))
            .collect();
        let gauges = self
            .gauges
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), f64::from_bits(v.load(Ordering::Relaxed))))
            .collect();
        let bucketed_histograms: HashMap<String, BucketedHistogramSnapshot> = self
            .histograms
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.snapshot()))
            .collect();
        let histograms = bucketed_histograms
            .iter()
            .map(|(k, v)| {
                (
                    k.clone(),
                    HistogramSummary {
                        count: v.count,
                        sum: v.sum,
                    },
                )
            })
            .collect();

        MetricsSnapshot {
            counters,
            gauges,
            histograms,
            bucketed_histograms,
        }
    }
}

impl Default for MetricsStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_accumulates_across_calls() {
        let store = MetricsStore::new();
        store.incr_counter("requests_total", 1);
        store.incr_counter("requests_total", 2);
        assert_eq!(store.snapshot().counters["requests_total"], 3);
    }

    #[test]
    fn gauge_overwrites() {
        let store = MetricsStore::new();
        store.set_gauge("queue_depth", 4.0);
        store.set_gauge("queue_depth", 7.0);
        assert_eq!(store.snapshot().gauges["queue_depth"], 7.0);
    }

    #[test]
    fn histogram_observations_feed_into_snapshot() {
        let store = MetricsStore::new();
        store.observe_histogram("latency_ms", 12.0);
        store.observe_histogram("latency_ms", 8.0);
        let snap = store.snapshot();
        assert_eq!(snap.histograms["latency_ms"].count, 2);
        assert_eq!(snap.histograms["latency_ms"].sum, 20.0);
    }
}
