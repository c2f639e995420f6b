//! Property tests for the latency histogram.
//!
//! Invariants tested:
//! - Every sample lands in exactly one bucket: the first whose bound covers it
//! - percentile(100) is at least the largest sample (within the last bound)
//! - Percentiles never decrease as p grows

use edge_resilience_metrics::{LatencyHistogram, DEFAULT_BOUNDS_MS};
use proptest::prelude::*;
use std::time::Duration;

fn expected_bucket(micros: u64) -> usize {
    DEFAULT_BOUNDS_MS
        .iter()
        .position(|&bound| micros <= bound * 1000)
        .unwrap_or(DEFAULT_BOUNDS_MS.len() - 1)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: a single sample increments exactly the expected bucket
    #[test]
    fn sample_lands_in_first_covering_bucket(micros in 0u64..=5_000_000) {
        let mut histogram = LatencyHistogram::default();
        histogram.record(Duration::from_micros(micros));

        let index = expected_bucket(micros);
        for (i, count) in histogram.counts().iter().enumerate() {
            prop_assert_eq!(*count, u64::from(i == index));
        }
        prop_assert_eq!(histogram.total(), 1);
    }

    /// Property: counts always sum to the number of samples
    #[test]
    fn counts_sum_to_total(samples in prop::collection::vec(0u64..=5_000_000, 0..200)) {
        let mut histogram = LatencyHistogram::default();
        for &micros in &samples {
            histogram.record(Duration::from_micros(micros));
        }
        prop_assert_eq!(histogram.counts().iter().sum::<u64>(), samples.len() as u64);
        prop_assert_eq!(histogram.total(), samples.len() as u64);
    }

    /// Property: the 100th percentile covers the largest sample
    #[test]
    fn p100_covers_max_sample(samples in prop::collection::vec(0u64..=1_000_000, 1..200)) {
        let mut histogram = LatencyHistogram::default();
        for &micros in &samples {
            histogram.record(Duration::from_micros(micros));
        }
        let max_micros = *samples.iter().max().unwrap();
        prop_assert!(histogram.percentile(100.0) * 1000 >= max_micros);
    }

    /// Property: percentiles are monotonic in p
    #[test]
    fn percentiles_are_monotonic(
        samples in prop::collection::vec(0u64..=2_000_000, 1..200),
        p in 0.0f64..=100.0,
        q in 0.0f64..=100.0,
    ) {
        let mut histogram = LatencyHistogram::default();
        for &micros in &samples {
            histogram.record(Duration::from_micros(micros));
        }
        let (lo, hi) = if p <= q { (p, q) } else { (q, p) };
        prop_assert!(histogram.percentile(lo) <= histogram.percentile(hi));
    }
}

#[test]
fn known_samples_fill_expected_buckets() {
    let mut histogram = LatencyHistogram::default();
    for ms in [2, 8, 40, 600] {
        histogram.record(Duration::from_millis(ms));
    }

    assert_eq!(histogram.counts(), &[0, 1, 1, 0, 1, 0, 0, 0, 1]);
    assert_eq!(histogram.total(), 4);
    assert_eq!(histogram.percentile(100.0), 1000);
    assert_eq!(histogram.percentile(50.0), 10);
}
