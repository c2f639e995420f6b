//! Full pipeline stress tests

use edge_resilience::{EdgeConfig, EdgeLayer};
use futures::future::join_all;
use http::{header, Request, Response, StatusCode};
use http_body_util::BodyExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tower::{Layer, ServiceExt};

/// Test: mixed traffic through every stage stays consistent
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[ignore]
async fn stress_mixed_traffic() {
    let mut config = EdgeConfig::default();
    config.rate_limit.requests_per_second = 0.001;
    config.rate_limit.burst = 50;
    let edge = EdgeLayer::from_config(config);

    let calls = Arc::new(AtomicUsize::new(0));
    let service = {
        let calls = Arc::clone(&calls);
        edge.layer(tower::service_fn(move |req: Request<()>| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::Relaxed);
                tokio::task::yield_now().await;
                Ok::<_, std::io::Error>(Response::new(req.uri().path().repeat(200)))
            }
        }))
    };

    const CLIENTS: usize = 200;
    const PER_CLIENT: usize = 60;
    let start = Instant::now();
    let tasks: Vec<_> = (0..CLIENTS * PER_CLIENT)
        .map(|i| {
            let service = service.clone();
            tokio::spawn(async move {
                let request = Request::get(format!("/page/{}", i % 37))
                    .header("x-forwarded-for", format!("10.1.{}.{}", (i % CLIENTS) / 256, (i % CLIENTS) % 256))
                    .header(header::ACCEPT_ENCODING, "gzip")
                    .body(())
                    .unwrap();
                let response = service.oneshot(request).await.unwrap();
                let status = response.status();
                response.into_body().collect().await.unwrap();
                status
            })
        })
        .collect();

    let mut ok = 0;
    let mut limited = 0;
    for status in join_all(tasks).await {
        match status.unwrap() {
            StatusCode::OK => ok += 1,
            StatusCode::TOO_MANY_REQUESTS => limited += 1,
            other => panic!("unexpected status {other}"),
        }
    }

    println!(
        "{} requests in {:?}: {ok} ok, {limited} limited, {} handler calls",
        CLIENTS * PER_CLIENT,
        start.elapsed(),
        calls.load(Ordering::Relaxed)
    );
    assert_eq!(ok, CLIENTS * 50);
    assert_eq!(limited, CLIENTS * (PER_CLIENT - 50));
    assert!(calls.load(Ordering::Relaxed) <= ok);
    assert_eq!(edge.in_flight(), 0);
    assert_eq!(edge.recorder().request_count() as usize, calls.load(Ordering::Relaxed));
}
