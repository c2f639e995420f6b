use super::*;
use edge_resilience::metrics::MetricsSnapshot;

#[tokio::test(start_paused = true)]
async fn handled_requests_are_recorded_and_rejections_are_not() {
    let backend = Backend::new(16);
    backend.set_delay(Duration::from_millis(20));
    let mut config = EdgeConfig::default();
    config.rate_limit.requests_per_second = 0.01;
    config.rate_limit.burst = 3;
    let (layer, service) = backend.behind(config);

    for i in 0..2 {
        send(&service, get(&format!("/ok/{i}"), "c")).await;
    }
    backend.set_server_error(true);
    send(&service, get("/fail", "c")).await;
    // over quota: never reaches the recorder
    send(&service, get("/rejected", "c")).await;

    let snapshot = layer.recorder().snapshot();
    assert_eq!(snapshot.request_count, 3);
    assert_eq!(snapshot.error_count, 1);
    assert_eq!(snapshot.average_latency_ms, 20.0);
    assert_eq!(snapshot.max_latency_ms, 20.0);
    assert_eq!(snapshot.p50_ms, 25);
    assert_eq!(snapshot.p99_ms, 25);
}

#[tokio::test(start_paused = true)]
async fn exporter_serves_the_snapshot() {
    let backend = Backend::new(8 * 1024);
    let (layer, service) = backend.behind(EdgeConfig::default());

    let response = send(&service, get_gzip("/catalog", "c")).await;
    body_bytes(response).await;

    let response = layer
        .exporter()
        .oneshot(Request::get("/metrics").body(()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let snapshot: MetricsSnapshot = serde_json::from_slice(&bytes).unwrap();

    assert_eq!(snapshot.request_count, 1);
    assert_eq!(snapshot.error_count, 0);
    assert_eq!(
        snapshot.bytes_saved,
        layer.compression_stats().bytes_saved()
    );
    assert!(snapshot.bytes_saved > 0);
}

#[tokio::test(start_paused = true)]
async fn disabled_recorder_sees_nothing() {
    let backend = Backend::new(16);
    let mut config = EdgeConfig::default();
    config.metrics.enabled = false;
    let (layer, service) = backend.behind(config);

    send(&service, get("/x", "c")).await;
    assert_eq!(layer.recorder().request_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn custom_buckets_shape_percentiles() {
    let backend = Backend::new(16);
    backend.set_delay(Duration::from_millis(30));
    let mut config = EdgeConfig::default();
    config.metrics.buckets_ms = vec![40, 400];
    let (layer, service) = backend.behind(config);

    send(&service, get("/x", "c")).await;
    assert_eq!(layer.recorder().percentile(99.0), 40);
}
