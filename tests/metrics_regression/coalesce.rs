//! Coalescing metrics regression tests

use super::helpers::*;
use edge_resilience_coalesce::CoalesceLayer;
use futures::future::join_all;
use http::{Request, Response};
use serial_test::serial;
use std::time::Duration;
use tower::{Layer, ServiceExt};

#[tokio::test(start_paused = true)]
#[serial]
async fn coalesce_metrics_exist() {
    init_recorder();

    let layer = CoalesceLayer::builder().name("test_coalesce").build();
    let service = layer.layer(tower::service_fn(|_req: Request<()>| async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok::<_, std::io::Error>(Response::new(String::from("shared")))
    }));

    join_all((0..3).map(|_| {
        service
            .clone()
            .oneshot(Request::get("/same").body(()).unwrap())
    }))
    .await;
    let _ = service
        .clone()
        .oneshot(Request::post("/same").body(()).unwrap())
        .await;

    assert_counter_exists("coalesce_requests_total");
    assert_metric_has_label("coalesce_requests_total", "coalesce", "test_coalesce");
    assert_metric_has_label("coalesce_requests_total", "role", "leader");
    assert_metric_has_label("coalesce_requests_total", "role", "waiter");
    assert_metric_has_label("coalesce_requests_total", "role", "bypass");

    assert_gauge_exists("coalesce_in_flight");
}
