//! Coalesce stress tests

use edge_resilience_coalesce::CoalesceLayer;
use futures::future::join_all;
use http::{Request, Response};
use http_body_util::BodyExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::{Layer, ServiceExt};

use super::ConcurrencyTracker;

/// Test: thousands of concurrent callers on one key share one execution
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[ignore]
async fn stress_high_concurrency_same_key() {
    let calls = Arc::new(AtomicUsize::new(0));
    let tracker = Arc::new(ConcurrencyTracker::new());

    let layer = CoalesceLayer::new();
    let service = {
        let calls = Arc::clone(&calls);
        let tracker = Arc::clone(&tracker);
        layer.layer(tower::service_fn(move |_req: Request<()>| {
            let calls = Arc::clone(&calls);
            let tracker = Arc::clone(&tracker);
            async move {
                tracker.enter();
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(200)).await;
                tracker.exit();
                Ok::<_, std::io::Error>(Response::new("x".repeat(10_000)))
            }
        }))
    };

    let start = Instant::now();
    let tasks: Vec<_> = (0..5_000)
        .map(|_| {
            let service = service.clone();
            tokio::spawn(async move {
                let response = service
                    .oneshot(Request::get("/hot").body(()).unwrap())
                    .await
                    .unwrap();
                response.into_body().collect().await.unwrap().to_bytes().len()
            })
        })
        .collect();
    let lengths: Vec<usize> = join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    println!(
        "5000 callers in {:?}, backend calls: {}",
        start.elapsed(),
        calls.load(Ordering::SeqCst)
    );
    assert!(lengths.iter().all(|&len| len == 10_000));
    // spawning 5000 tasks can outlast one execution; a handful of rounds is fine
    assert!(calls.load(Ordering::SeqCst) <= 5);
    assert_eq!(tracker.peak(), 1);
    assert_eq!(layer.in_flight(), 0);
}

/// Test: many distinct keys at once leave nothing behind
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[ignore]
async fn stress_many_keys_cleanup() {
    let layer = CoalesceLayer::new();
    let service = layer.layer(tower::service_fn(|_req: Request<()>| async {
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok::<_, std::io::Error>(Response::new(String::from("ok")))
    }));

    let tasks: Vec<_> = (0..10_000)
        .map(|i| {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .oneshot(Request::get(format!("/k/{}", i % 500)).body(()).unwrap())
                    .await
                    .map(|r| r.status())
            })
        })
        .collect();
    for task in join_all(tasks).await {
        assert!(task.unwrap().is_ok());
    }
    assert_eq!(layer.in_flight(), 0);
}
