use super::*;
use flate2::read::GzDecoder;
use futures::future::join_all;
use std::io::Read;

fn slow_backend(body_len: usize) -> Backend {
    let backend = Backend::new(body_len);
    backend.set_delay(Duration::from_millis(50));
    backend
}

#[tokio::test(start_paused = true)]
async fn concurrent_identical_gets_share_one_execution() {
    let backend = slow_backend(64);
    let (layer, service) = backend.behind(EdgeConfig::default());

    let responses = join_all(
        (0..10).map(|i| send(&service, get("/report?year=2024", &format!("10.0.0.{i}")))),
    )
    .await;
    assert_eq!(backend.calls(), 1);
    assert_eq!(layer.in_flight(), 0);

    let mut bodies = Vec::new();
    for response in responses {
        assert_eq!(response.status(), StatusCode::OK);
        bodies.push(body_bytes(response).await);
    }
    assert!(bodies.iter().all(|b| *b == bodies[0]));
    assert_eq!(bodies[0], payload("/report", 64).as_bytes());
}

#[tokio::test(start_paused = true)]
async fn different_queries_execute_separately() {
    let backend = slow_backend(64);
    let (_layer, service) = backend.behind(EdgeConfig::default());

    join_all([
        send(&service, get("/search?q=a", "c1")),
        send(&service, get("/search?q=b", "c2")),
        send(&service, get("/search?q=a", "c3")),
    ])
    .await;
    assert_eq!(backend.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn posts_are_never_coalesced() {
    let backend = slow_backend(64);
    let (_layer, service) = backend.behind(EdgeConfig::default());

    let post = |client: &str| {
        Request::post("/orders")
            .header("x-forwarded-for", client)
            .body(())
            .unwrap()
    };
    join_all((0..4).map(|i| send(&service, post(&format!("c{i}"))))).await;
    assert_eq!(backend.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn sequential_requests_each_execute() {
    let backend = slow_backend(64);
    let (_layer, service) = backend.behind(EdgeConfig::default());

    send(&service, get("/items", "c")).await;
    send(&service, get("/items", "c")).await;
    assert_eq!(backend.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn waiters_receive_the_leaders_failure() {
    let backend = slow_backend(64);
    backend.set_hard_error(true);
    let (_layer, service) = backend.behind(EdgeConfig::default());

    let responses =
        join_all((0..5).map(|i| send(&service, get("/unstable", &format!("c{i}"))))).await;
    assert_eq!(backend.calls(), 1);
    for response in responses {
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({ "error": "backend exploded" })
        );
    }
}

#[tokio::test(start_paused = true)]
async fn gzip_and_identity_callers_are_kept_apart() {
    let backend = slow_backend(4096);
    let (_layer, service) = backend.behind(EdgeConfig::default());

    let responses = join_all((0..6).map(|i| {
        let client = format!("c{i}");
        if i % 2 == 0 {
            send(&service, get_gzip("/big", &client))
        } else {
            send(&service, get("/big", &client))
        }
    }))
    .await;
    assert_eq!(backend.calls(), 2);

    let expected = payload("/big", 4096);
    for (i, response) in responses.into_iter().enumerate() {
        let gzipped = response.headers().get(header::CONTENT_ENCODING).is_some();
        assert_eq!(gzipped, i % 2 == 0, "response {i}");
        let bytes = body_bytes(response).await;
        let text = if gzipped {
            let mut out = String::new();
            GzDecoder::new(&bytes[..]).read_to_string(&mut out).unwrap();
            out
        } else {
            String::from_utf8(bytes.to_vec()).unwrap()
        };
        assert_eq!(text, expected);
    }
}

#[tokio::test(start_paused = true)]
async fn disabled_coalescing_runs_every_request() {
    let backend = slow_backend(64);
    let mut config = EdgeConfig::default();
    config.coalescing.enabled = false;
    let (_layer, service) = backend.behind(config);

    join_all((0..4).map(|i| send(&service, get("/same", &format!("c{i}"))))).await;
    assert_eq!(backend.calls(), 4);
}
