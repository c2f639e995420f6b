//! Property tests for admission control.
//!
//! Invariants tested:
//! - An untouched bucket admits exactly `burst` instantaneous requests
//! - A client pacing itself at or below the rate is never rejected
//! - Tokens never exceed the burst capacity, however long the client idles

use edge_resilience_ratelimiter::AdmissionController;
use proptest::prelude::*;
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};

fn paused_runtime() -> Runtime {
    Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Property: burst + extra instantaneous requests admit exactly burst
    #[test]
    fn instantaneous_burst_admits_exactly_burst(
        burst in 1u32..=200,
        extra in 1u32..=50,
    ) {
        let rt = paused_runtime();
        rt.block_on(async {
            let controller = AdmissionController::new(1.0, burst);
            let admitted = (0..burst + extra).filter(|_| controller.admit("c")).count();
            prop_assert_eq!(admitted, burst as usize);
            Ok::<(), TestCaseError>(())
        })?;
    }

    /// Property: requests spaced at least 1/rate apart are all admitted
    #[test]
    fn paced_clients_are_never_rejected(
        rate in 1u32..=200,
        burst in 1u32..=10,
        requests in 1usize..=100,
    ) {
        let rt = paused_runtime();
        rt.block_on(async {
            let controller = AdmissionController::new(f64::from(rate), burst);
            let spacing = Duration::from_millis(1000u64.div_ceil(u64::from(rate)) + 1);
            for i in 0..requests {
                prop_assert!(controller.admit("steady"), "request {} rejected", i);
                tokio::time::advance(spacing).await;
            }
            Ok::<(), TestCaseError>(())
        })?;
    }

    /// Property: after any idle period at most burst requests pass at once
    #[test]
    fn idle_time_never_overfills_the_bucket(
        burst in 1u32..=50,
        idle_secs in 0u64..=3600,
    ) {
        let rt = paused_runtime();
        rt.block_on(async {
            let controller = AdmissionController::new(10.0, burst);
            controller.admit("c");
            tokio::time::advance(Duration::from_secs(idle_secs)).await;
            let admitted = (0..burst * 2).filter(|_| controller.admit("c")).count();
            prop_assert!(admitted <= burst as usize);
            Ok::<(), TestCaseError>(())
        })?;
    }
}
