//! Property tests for the circuit breaker.
//!
//! Invariants tested:
//! - The circuit opens exactly when `threshold` consecutive failures occur
//! - While open (cooldown not elapsed) no call is permitted

use edge_resilience_circuitbreaker::{Circuit, CircuitState};
use proptest::prelude::*;
use std::time::Duration;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: breaker state follows a simple consecutive-failure model
    #[test]
    fn opens_on_consecutive_failures(
        threshold in 1u32..=10,
        outcomes in prop::collection::vec(any::<bool>(), 0..100),
    ) {
        let circuit = Circuit::new(threshold, Duration::from_secs(3600), 1);
        let mut streak = 0;
        let mut open = false;

        for failed in outcomes {
            if open {
                prop_assert!(!circuit.can_execute());
                continue;
            }
            prop_assert!(circuit.can_execute());
            if failed {
                circuit.record_failure();
                streak += 1;
            } else {
                circuit.record_success();
                streak = 0;
            }
            open = streak >= threshold;

            let expected = if open { CircuitState::Open } else { CircuitState::Closed };
            prop_assert_eq!(circuit.state(), expected);
        }
    }
}
