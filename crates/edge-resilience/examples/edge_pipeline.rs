//! The full edge pipeline in front of a toy handler.
//!
//! Run with: cargo run -p edge-resilience --example edge_pipeline
//! More detail: RUST_LOG=debug cargo run -p edge-resilience --example edge_pipeline

use edge_resilience::{EdgeConfig, EdgeLayer};
use http::{header, Request, Response, StatusCode};
use http_body_util::BodyExt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::{service_fn, Layer, ServiceExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = EdgeConfig::from_json(
        r#"{
            "rate_limit": { "requests_per_second": 5.0, "burst": 5 },
            "circuit_breaker": { "failure_threshold": 3, "cooldown_secs": 1, "half_open_max_calls": 1 },
            "compression": { "min_size": 256 }
        }"#,
    )
    .expect("valid config");

    let edge = EdgeLayer::builder().config(config).name("demo").build();

    let calls = Arc::new(AtomicUsize::new(0));
    let healthy = Arc::new(AtomicBool::new(true));
    let handler = {
        let calls = Arc::clone(&calls);
        let healthy = Arc::clone(&healthy);
        service_fn(move |req: Request<()>| {
            let calls = Arc::clone(&calls);
            let healthy = healthy.load(Ordering::SeqCst);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                let mut response = Response::new(format!("{} {}\n", req.method(), req.uri()).repeat(64));
                if !healthy {
                    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                }
                Ok::<_, std::convert::Infallible>(response)
            }
        })
    };
    let service = edge.layer(handler);

    println!("== coalescing: 4 identical GETs at once");
    let requests = (0..4).map(|i| {
        let request = Request::get("/catalog?page=1")
            .header("x-forwarded-for", format!("10.0.0.{i}"))
            .header(header::ACCEPT_ENCODING, "gzip")
            .body(())
            .expect("request");
        service.clone().oneshot(request)
    });
    for response in futures::future::join_all(requests).await {
        let response = response.expect("infallible");
        println!(
            "  {} content-encoding={:?}",
            response.status(),
            response.headers().get(header::CONTENT_ENCODING)
        );
    }
    println!("  handler calls: {}", calls.load(Ordering::SeqCst));

    println!("== admission: one client, 8 requests");
    for i in 0..8 {
        let request = Request::get(format!("/items/{i}"))
            .header("x-forwarded-for", "192.168.1.20")
            .body(())
            .expect("request");
        let response = service.clone().oneshot(request).await.expect("infallible");
        println!("  request {i}: {}", response.status());
    }

    println!("== circuit breaker: handler starts failing");
    healthy.store(false, Ordering::SeqCst);
    for i in 0..5 {
        let request = Request::get(format!("/orders/{i}"))
            .header("x-forwarded-for", format!("172.16.0.{i}"))
            .body(())
            .expect("request");
        let response = service.clone().oneshot(request).await.expect("infallible");
        let status = response.status();
        let body = response.into_body().collect().await.expect("body").to_bytes();
        println!("  request {i}: {status} {}", String::from_utf8_lossy(&body[..body.len().min(80)]));
    }
    println!("  circuit: {:?}", edge.circuit().state());

    let response = edge
        .exporter()
        .oneshot(Request::get("/metrics").body(()).expect("request"))
        .await
        .expect("infallible");
    let body = response.into_body().collect().await.expect("body").to_bytes();
    println!("== metrics\n  {}", String::from_utf8_lossy(&body));
}
