//! Pipeline metrics.
//!
//! Counters are process-wide and monotonically increasing; the scheduler
//! logs a snapshot after every round.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A counter metric.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Latency histogram in milliseconds.
#[derive(Debug)]
pub struct Histogram {
    /// Buckets: 10ms, 50ms, 100ms, 500ms, 1s, 5s, 30s, 60s
    buckets: [AtomicU64; 8],
    sum: AtomicU64,
    count: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    const BUCKET_BOUNDS: [u64; 8] = [10, 50, 100, 500, 1000, 5000, 30_000, 60_000];

    pub fn new() -> Self {
        Self {
            buckets: Default::default(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Records a value in milliseconds.
    pub fn observe(&self, ms: u64) {
        self.sum.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        let last = Self::BUCKET_BOUNDS.len() - 1;
        let idx = Self::BUCKET_BOUNDS
            .iter()
            .position(|&bound| ms <= bound)
            .unwrap_or(last);
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum() as f64 / count as f64
        }
    }

    /// Returns (upper bound, count) per bucket.
    pub fn buckets(&self) -> Vec<(u64, u64)> {
        Self::BUCKET_BOUNDS
            .iter()
            .zip(self.buckets.iter())
            .map(|(&bound, count)| (bound, count.load(Ordering::Relaxed)))
            .collect()
    }
}

/// Collected metrics for the pipeline.
#[derive(Debug, Default)]
pub struct Metrics {
    // Ocean
    pub items_fed: Counter,
    pub feed_failures: Counter,
    pub queue_records_drained: Counter,

    // Identities
    pub identities_loaded: Counter,
    pub identity_batches: Counter,

    // Enrich
    pub items_enriched: Counter,
    pub enrich_item_errors: Counter,
    pub enrich_failures: Counter,
    pub eitems_refreshed: Counter,

    // Studies
    pub studies_run: Counter,
    pub studies_failed: Counter,

    // Store
    pub documents_uploaded: Counter,
    pub documents_expired: Counter,
    pub upload_latency_ms: Histogram,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            items_fed: self.items_fed.get(),
            feed_failures: self.feed_failures.get(),
            queue_records_drained: self.queue_records_drained.get(),
            identities_loaded: self.identities_loaded.get(),
            identity_batches: self.identity_batches.get(),
            items_enriched: self.items_enriched.get(),
            enrich_item_errors: self.enrich_item_errors.get(),
            enrich_failures: self.enrich_failures.get(),
            eitems_refreshed: self.eitems_refreshed.get(),
            studies_run: self.studies_run.get(),
            studies_failed: self.studies_failed.get(),
            documents_uploaded: self.documents_uploaded.get(),
            documents_expired: self.documents_expired.get(),
            upload_latency_mean_ms: self.upload_latency_ms.mean(),
        }
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub items_fed: u64,
    pub feed_failures: u64,
    pub queue_records_drained: u64,
    pub identities_loaded: u64,
    pub identity_batches: u64,
    pub items_enriched: u64,
    pub enrich_item_errors: u64,
    pub enrich_failures: u64,
    pub eitems_refreshed: u64,
    pub studies_run: u64,
    pub studies_failed: u64,
    pub documents_uploaded: u64,
    pub documents_expired: u64,
    pub upload_latency_mean_ms: f64,
}

/// Global metrics registry.
pub static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::new);

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}
