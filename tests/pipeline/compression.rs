use super::*;
use flate2::read::GzDecoder;
use std::io::Read;

fn gunzip(bytes: &[u8]) -> String {
    let mut out = String::new();
    GzDecoder::new(bytes).read_to_string(&mut out).unwrap();
    out
}

#[tokio::test]
async fn large_bodies_round_trip_through_gzip() {
    let backend = Backend::new(8 * 1024);
    let (layer, service) = backend.behind(EdgeConfig::default());

    let response = send(&service, get_gzip("/catalog", "c")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_ENCODING], "gzip");
    assert_eq!(response.headers()[header::VARY], "Accept-Encoding");
    assert!(response.headers().get(header::CONTENT_LENGTH).is_none());

    let compressed = body_bytes(response).await;
    assert!(compressed.len() < 8 * 1024);
    assert_eq!(gunzip(&compressed), payload("/catalog", 8 * 1024));

    let stats = layer.compression_stats();
    assert_eq!(stats.responses_compressed(), 1);
    assert_eq!(stats.bytes_in(), 8 * 1024);
    assert!(stats.bytes_saved() > 0);
}

#[tokio::test]
async fn bodies_below_the_threshold_are_sent_as_is() {
    let backend = Backend::new(1023);
    let (_layer, service) = backend.behind(EdgeConfig::default());

    let response = send(&service, get_gzip("/small", "c")).await;
    assert!(response.headers().get(header::CONTENT_ENCODING).is_none());
    assert_eq!(body_bytes(response).await, payload("/small", 1023).as_bytes());
}

#[tokio::test]
async fn threshold_is_configurable() {
    let backend = Backend::new(300);
    let mut config = EdgeConfig::default();
    config.compression.min_size = 256;
    config.compression.level = 9;
    let (_layer, service) = backend.behind(config);

    let response = send(&service, get_gzip("/mid", "c")).await;
    assert_eq!(response.headers()[header::CONTENT_ENCODING], "gzip");
    assert_eq!(gunzip(&body_bytes(response).await), payload("/mid", 300));
}

#[tokio::test]
async fn callers_without_gzip_get_identity() {
    let backend = Backend::new(4096);
    let (_layer, service) = backend.behind(EdgeConfig::default());

    for accept in [None, Some("br"), Some("gzip;q=0"), Some("identity")] {
        let mut request = get("/plain", "c");
        if let Some(value) = accept {
            request
                .headers_mut()
                .insert(header::ACCEPT_ENCODING, value.parse().unwrap());
        }
        let response = send(&service, request).await;
        assert!(
            response.headers().get(header::CONTENT_ENCODING).is_none(),
            "accept-encoding {accept:?}"
        );
        assert_eq!(body_bytes(response).await.len(), 4096);
    }
}

#[tokio::test]
async fn server_errors_are_not_compressed() {
    let backend = Backend::new(4096);
    backend.set_server_error(true);
    let (_layer, service) = backend.behind(EdgeConfig::default());

    let response = send(&service, get_gzip("/err", "c")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.headers().get(header::CONTENT_ENCODING).is_none());
}

#[tokio::test]
async fn disabled_compression_passes_bodies_through() {
    let backend = Backend::new(4096);
    let mut config = EdgeConfig::default();
    config.compression.enabled = false;
    let (_layer, service) = backend.behind(config);

    let response = send(&service, get_gzip("/plain", "c")).await;
    assert!(response.headers().get(header::CONTENT_ENCODING).is_none());
    assert_eq!(body_bytes(response).await.len(), 4096);
}
