//! Admission control stress tests

use edge_resilience_ratelimiter::AdmissionController;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Test: many threads hammering one client never over-admit
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[ignore]
async fn stress_single_client_contention() {
    const BURST: u32 = 1_000;
    let controller = Arc::new(AdmissionController::new(0.001, BURST));
    let admitted = Arc::new(AtomicUsize::new(0));

    let tasks: Vec<_> = (0..64)
        .map(|_| {
            let controller = Arc::clone(&controller);
            let admitted = Arc::clone(&admitted);
            tokio::spawn(async move {
                for _ in 0..1_000 {
                    if controller.admit("hot") {
                        admitted.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    println!("admitted {} of 64000", admitted.load(Ordering::Relaxed));
    assert_eq!(admitted.load(Ordering::Relaxed), BURST as usize);
}

/// Test: a hundred thousand distinct clients, then a sweep
#[tokio::test]
#[ignore]
async fn stress_many_clients_then_sweep() {
    let controller = AdmissionController::new(10.0, 5)
        .with_idle_ttl(Duration::from_millis(50), Duration::from_secs(60));

    let start = Instant::now();
    for i in 0..100_000 {
        assert!(controller.admit(&format!("client-{i}")));
    }
    println!("100k first admissions in {:?}", start.elapsed());
    assert_eq!(controller.bucket_count(), 100_000);

    tokio::time::sleep(Duration::from_millis(100)).await;
    let removed = controller.sweep();
    println!("swept {removed} idle buckets");
    assert_eq!(removed, 100_000);
    assert_eq!(controller.bucket_count(), 0);
}
