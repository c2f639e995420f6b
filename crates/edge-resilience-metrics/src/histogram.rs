use std::time::Duration;
use thiserror::Error;

/// Default bucket upper bounds, in milliseconds.
pub const DEFAULT_BOUNDS_MS: [u64; 9] = [1, 5, 10, 25, 50, 100, 250, 500, 1000];

/// Rejected bucket layouts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistogramError {
    /// No bounds were given.
    #[error("histogram needs at least one bucket bound")]
    Empty,
    /// `bounds[index]` is not greater than the bound before it.
    #[error("histogram bounds must be strictly increasing (at index {index})")]
    NotIncreasing {
        /// Position of the offending bound.
        index: usize,
    },
}

/// Fixed-bucket latency distribution.
///
/// A sample lands in the first bucket whose upper bound is at least the
/// sample; samples above the last bound are counted in the last bucket.
/// Percentiles are therefore bucket bounds, and are exact only to the bucket
/// resolution.
#[derive(Debug, Clone)]
pub struct LatencyHistogram {
    bounds_ms: Vec<u64>,
    counts: Vec<u64>,
    total: u64,
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self {
            bounds_ms: DEFAULT_BOUNDS_MS.to_vec(),
            counts: vec![0; DEFAULT_BOUNDS_MS.len()],
            total: 0,
        }
    }
}

impl LatencyHistogram {
    /// Creates a histogram with the given upper bounds in milliseconds.
    ///
    /// ```
    /// use edge_resilience_metrics::{HistogramError, LatencyHistogram};
    ///
    /// assert!(LatencyHistogram::new(vec![10, 100, 1000]).is_ok());
    /// assert_eq!(
    ///     LatencyHistogram::new(vec![10, 10]).unwrap_err(),
    ///     HistogramError::NotIncreasing { index: 1 }
    /// );
    /// ```
    pub fn new(bounds_ms: Vec<u64>) -> Result<Self, HistogramError> {
        validate_bounds(&bounds_ms)?;
        Ok(Self {
            counts: vec![0; bounds_ms.len()],
            bounds_ms,
            total: 0,
        })
    }

    /// Counts one sample.
    pub fn record(&mut self, latency: Duration) {
        let micros = latency.as_micros();
        let index = self
            .bounds_ms
            .iter()
            .position(|&bound| micros <= u128::from(bound) * 1000)
            .unwrap_or(self.bounds_ms.len() - 1);
        self.counts[index] += 1;
        self.total += 1;
    }

    /// Estimated latency, in milliseconds, below which `p` percent of the
    /// samples fall. Returns 0 when nothing has been recorded.
    pub fn percentile(&self, p: f64) -> u64 {
        if self.total == 0 {
            return 0;
        }
        let p = if p.is_nan() { 0.0 } else { p.clamp(0.0, 100.0) };
        let target = ((p / 100.0) * self.total as f64).ceil().max(1.0) as u64;

        let mut seen = 0;
        for (bound, count) in self.bounds_ms.iter().zip(&self.counts) {
            seen += count;
            if seen >= target {
                return *bound;
            }
        }
        self.bounds_ms[self.bounds_ms.len() - 1]
    }

    /// Number of samples recorded.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Bucket upper bounds in milliseconds.
    pub fn bounds_ms(&self) -> &[u64] {
        &self.bounds_ms
    }

    /// Per-bucket sample counts, parallel to [`bounds_ms`](Self::bounds_ms).
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }
}

pub(crate) fn validate_bounds(bounds_ms: &[u64]) -> Result<(), HistogramError> {
    if bounds_ms.is_empty() {
        return Err(HistogramError::Empty);
    }
    match bounds_ms.windows(2).position(|pair| pair[1] <= pair[0]) {
        Some(i) => Err(HistogramError::NotIncreasing { index: i + 1 }),
        None => Ok(()),
    }
}
