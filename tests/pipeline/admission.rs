use super::*;
use edge_resilience::core::PeerAddr;
use futures::future::join_all;

fn limited(rate: f64, burst: u32) -> EdgeConfig {
    let mut config = EdgeConfig::default();
    config.rate_limit.requests_per_second = rate;
    config.rate_limit.burst = burst;
    config
}

#[tokio::test(start_paused = true)]
async fn burst_is_admitted_then_rejected_with_429() {
    let backend = Backend::new(16);
    let (_layer, service) = backend.behind(limited(10.0, 10));

    for i in 0..10 {
        let response = send(&service, get(&format!("/items/{i}"), "10.0.0.1")).await;
        assert_eq!(response.status(), StatusCode::OK, "request {i}");
    }

    let rejected = send(&service, get("/items/10", "10.0.0.1")).await;
    assert_eq!(rejected.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(rejected.headers()[header::RETRY_AFTER], "1");
    assert_eq!(
        body_json(rejected).await,
        serde_json::json!({"error": "Rate limit exceeded. Please try again later."})
    );
    assert_eq!(backend.calls(), 10);
}

#[tokio::test(start_paused = true)]
async fn half_a_second_refills_half_the_bucket() {
    let backend = Backend::new(16);
    let (_layer, service) = backend.behind(limited(10.0, 10));

    for i in 0..10 {
        send(&service, get(&format!("/a/{i}"), "client")).await;
    }
    assert_eq!(
        send(&service, get("/a/x", "client")).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );

    tokio::time::advance(Duration::from_millis(500)).await;

    let mut admitted = 0;
    for i in 0..8 {
        if send(&service, get(&format!("/b/{i}"), "client")).await.status() == StatusCode::OK {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 5);
}

#[tokio::test(start_paused = true)]
async fn clients_have_independent_buckets() {
    let backend = Backend::new(16);
    let (layer, service) = backend.behind(limited(1.0, 2));

    for _ in 0..2 {
        send(&service, get("/x", "10.0.0.1")).await;
    }
    assert_eq!(
        send(&service, get("/x", "10.0.0.1")).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );
    assert_eq!(send(&service, get("/x", "10.0.0.2")).await.status(), StatusCode::OK);
    assert_eq!(layer.controller().bucket_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn identity_falls_back_to_real_ip_then_peer_address() {
    let backend = Backend::new(16);
    let (layer, service) = backend.behind(limited(1.0, 1));

    let real_ip = || {
        Request::get("/x")
            .header("x-real-ip", "203.0.113.9")
            .body(())
            .unwrap()
    };
    assert_eq!(send(&service, real_ip()).await.status(), StatusCode::OK);
    assert_eq!(
        send(&service, real_ip()).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );

    let peer = || {
        let mut request = Request::get("/x").body(()).unwrap();
        request
            .extensions_mut()
            .insert(PeerAddr("198.51.100.4:5000".parse().unwrap()));
        request
    };
    assert_eq!(send(&service, peer()).await.status(), StatusCode::OK);
    assert_eq!(
        send(&service, peer()).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );

    // no identity at all
    assert_eq!(
        send(&service, Request::get("/x").body(()).unwrap()).await.status(),
        StatusCode::OK
    );
    assert_eq!(layer.controller().bucket_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn disabled_admission_never_rejects() {
    let backend = Backend::new(16);
    let mut config = limited(1.0, 1);
    config.rate_limit.enabled = false;
    let (_layer, service) = backend.behind(config);

    for i in 0..20 {
        let response = send(&service, get(&format!("/x/{i}"), "10.0.0.1")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
    assert_eq!(backend.calls(), 20);
}

#[tokio::test(start_paused = true)]
async fn clients_below_the_rate_are_never_rejected() {
    let backend = Backend::new(16);
    let (_layer, service) = backend.behind(limited(10.0, 1));

    for i in 0..50 {
        let response = send(&service, get(&format!("/x/{i}"), "steady")).await;
        assert_eq!(response.status(), StatusCode::OK, "request {i}");
        tokio::time::advance(Duration::from_millis(100)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_burst_plus_one_admits_exactly_burst() {
    const BURST: u32 = 25;
    let backend = Backend::new(16);
    let (_layer, service) = backend.behind(limited(0.001, BURST));

    let tasks = (0..=BURST).map(|i| {
        let service = service.clone();
        tokio::spawn(async move {
            send_owned(service, get(&format!("/c/{i}"), "10.9.9.9"))
                .await
                .status()
        })
    });
    let statuses: Vec<StatusCode> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let admitted = statuses.iter().filter(|s| **s == StatusCode::OK).count();
    let rejected = statuses
        .iter()
        .filter(|s| **s == StatusCode::TOO_MANY_REQUESTS)
        .count();
    assert_eq!(admitted, BURST as usize);
    assert_eq!(rejected, 1);
}
