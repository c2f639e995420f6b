//! Compression metrics regression tests

use super::helpers::*;
use edge_resilience_compression::CompressionLayer;
use http::{header, Request, Response};
use http_body_util::BodyExt;
use serial_test::serial;
use tower::{Layer, ServiceExt};

#[tokio::test]
#[serial]
async fn compression_metrics_exist() {
    init_recorder();

    let layer = CompressionLayer::builder().name("test_gzip").build();
    let service = layer.layer(tower::service_fn(|req: Request<()>| async move {
        let len = if req.uri().path() == "/big" { 4096 } else { 10 };
        Ok::<_, std::io::Error>(Response::new("z".repeat(len)))
    }));

    for path in ["/big", "/small"] {
        let request = Request::get(path)
            .header(header::ACCEPT_ENCODING, "gzip")
            .body(())
            .unwrap();
        let response = service.clone().oneshot(request).await.unwrap();
        response.into_body().collect().await.unwrap();
    }

    assert_counter_exists("compression_responses_total");
    assert_metric_has_label("compression_responses_total", "compressor", "test_gzip");
    assert_metric_has_label("compression_responses_total", "outcome", "compressed");
    assert_metric_has_label("compression_responses_total", "outcome", "below_threshold");

    assert_counter_exists("compression_bytes_saved_total");
}
