//! Admission control metrics regression tests

use super::helpers::*;
use edge_resilience_ratelimiter::RateLimiterLayer;
use http::Request;
use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;
use tower::{Layer, ServiceExt};

fn request(client: &str) -> Request<()> {
    Request::get("/")
        .header("x-forwarded-for", client)
        .body(())
        .unwrap()
}

#[tokio::test]
#[serial]
async fn ratelimiter_metrics_exist() {
    init_recorder();

    let layer = RateLimiterLayer::builder()
        .name("test_rl")
        .requests_per_second(1.0)
        .burst(1)
        .build();
    let service = layer.layer(tower::service_fn(|_req: Request<()>| async {
        Ok::<_, std::io::Error>(())
    }));

    let _ = service.clone().oneshot(request("a")).await;
    let _ = service.clone().oneshot(request("a")).await;
    layer.controller().sweep();

    assert_counter_exists("ratelimiter_calls_total");
    assert_metric_has_label("ratelimiter_calls_total", "ratelimiter", "test_rl");
    assert_metric_has_label("ratelimiter_calls_total", "outcome", "admitted");
    assert_metric_has_label("ratelimiter_calls_total", "outcome", "rejected");

    assert_gauge_exists("ratelimiter_tracked_clients");
}

#[tokio::test(start_paused = true)]
#[serial]
async fn ratelimiter_adaptive_rate_gauge() {
    init_recorder();

    let layer = RateLimiterLayer::builder()
        .name("adaptive_rl")
        .requests_per_second(100.0)
        .adaptive(Arc::new(|| 0.9), Duration::from_secs(10))
        .build();
    let service = layer.layer(tower::service_fn(|_req: Request<()>| async {
        Ok::<_, std::io::Error>(())
    }));

    let _ = service.clone().oneshot(request("a")).await;
    tokio::time::advance(Duration::from_secs(11)).await;
    let _ = service.clone().oneshot(request("a")).await;

    assert_gauge_exists("ratelimiter_effective_rate");
    assert_metric_has_label("ratelimiter_effective_rate", "ratelimiter", "adaptive_rl");
}
