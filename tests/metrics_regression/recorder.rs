//! Latency recorder metrics regression tests

use super::helpers::*;
use edge_resilience_metrics::MetricsLayer;
use http::{Request, Response, StatusCode};
use serial_test::serial;
use tower::{Layer, ServiceExt};

#[tokio::test]
#[serial]
async fn recorder_metrics_exist() {
    init_recorder();

    let layer = MetricsLayer::builder().name("test_edge").build();
    let service = layer.layer(tower::service_fn(|req: Request<()>| async move {
        let mut response = Response::new(());
        if req.uri().path() == "/fail" {
            *response.status_mut() = StatusCode::BAD_GATEWAY;
        }
        Ok::<_, std::io::Error>(response)
    }));

    for path in ["/ok", "/fail"] {
        let _ = service
            .clone()
            .oneshot(Request::get(path).body(()).unwrap())
            .await;
    }

    assert_counter_exists("edge_requests_total");
    assert_metric_has_label("edge_requests_total", "recorder", "test_edge");
    assert_metric_has_label("edge_requests_total", "outcome", "success");
    assert_metric_has_label("edge_requests_total", "outcome", "error");

    assert_histogram_exists("edge_request_duration_seconds");
    assert_metric_has_label("edge_request_duration_seconds", "recorder", "test_edge");
}
