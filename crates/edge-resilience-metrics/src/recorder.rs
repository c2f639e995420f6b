use crate::histogram::{HistogramError, LatencyHistogram};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Reports a running "bytes saved" total from elsewhere in the pipeline.
pub type BytesSavedSource = Arc<dyn Fn() -> u64 + Send + Sync>;

/// Point-in-time view of the recorder, as served by the metrics endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub request_count: u64,
    pub error_count: u64,
    pub average_latency_ms: f64,
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
    pub max_latency_ms: f64,
    pub bytes_saved: u64,
}

/// Request, error and latency accounting for one pipeline.
///
/// Counters are atomics; the histogram sits behind a reader/writer lock so
/// percentile queries run alongside each other.
pub struct MetricsRecorder {
    requests: AtomicU64,
    errors: AtomicU64,
    total_latency_us: AtomicU64,
    max_latency_us: AtomicU64,
    histogram: RwLock<LatencyHistogram>,
    bytes_saved: Option<BytesSavedSource>,
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::with_histogram(LatencyHistogram::default())
    }
}

impl MetricsRecorder {
    /// Creates a recorder with the default bucket bounds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a recorder with custom bucket bounds in milliseconds.
    pub fn with_bounds(bounds_ms: Vec<u64>) -> Result<Self, HistogramError> {
        Ok(Self::with_histogram(LatencyHistogram::new(bounds_ms)?))
    }

    fn with_histogram(histogram: LatencyHistogram) -> Self {
        Self {
            requests: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            total_latency_us: AtomicU64::new(0),
            max_latency_us: AtomicU64::new(0),
            histogram: RwLock::new(histogram),
            bytes_saved: None,
        }
    }

    /// Includes `source` as `bytes_saved` in snapshots.
    pub fn with_bytes_saved(mut self, source: BytesSavedSource) -> Self {
        self.bytes_saved = Some(source);
        self
    }

    /// Records one finished request.
    pub fn record(&self, latency: Duration, is_error: bool) {
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);

        self.requests.fetch_add(1, Ordering::Relaxed);
        if is_error {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
        self.total_latency_us.fetch_add(micros, Ordering::Relaxed);
        self.max_latency_us.fetch_max(micros, Ordering::Relaxed);
        self.histogram.write().record(latency);
    }

    /// Requests recorded so far.
    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// Requests that ended in an error or a 5xx response.
    pub fn error_count(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Latency estimate in milliseconds for percentile `p` (0-100).
    pub fn percentile(&self, p: f64) -> u64 {
        self.histogram.read().percentile(p)
    }

    /// Copy of the current histogram.
    pub fn histogram(&self) -> LatencyHistogram {
        self.histogram.read().clone()
    }

    /// Gathers every figure into one snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let request_count = self.request_count();
        let total_us = self.total_latency_us.load(Ordering::Relaxed);
        let average_latency_ms = if request_count == 0 {
            0.0
        } else {
            total_us as f64 / request_count as f64 / 1000.0
        };

        let (p50_ms, p95_ms, p99_ms) = {
            let histogram = self.histogram.read();
            (
                histogram.percentile(50.0),
                histogram.percentile(95.0),
                histogram.percentile(99.0),
            )
        };

        MetricsSnapshot {
            request_count,
            error_count: self.error_count(),
            average_latency_ms,
            p50_ms,
            p95_ms,
            p99_ms,
            max_latency_ms: self.max_latency_us.load(Ordering::Relaxed) as f64 / 1000.0,
            bytes_saved: self.bytes_saved.as_ref().map_or(0, |source| source()),
        }
    }
}

impl std::fmt::Debug for MetricsRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRecorder")
            .field("requests", &self.request_count())
            .field("errors", &self.error_count())
            .finish_non_exhaustive()
    }
}
