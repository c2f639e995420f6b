//! Pipeline integration tests.
//!
//! - admission.rs: per-client token buckets, refill, isolation
//! - circuit.rs: opening, rejection, half-open recovery
//! - coalescing.rs: concurrent duplicate suppression
//! - compression.rs: gzip negotiation and thresholds
//! - recording.rs: latency recorder and exporter

mod admission;
mod coalescing;
mod compression;
mod recording;

use bytes::Bytes;
use edge_resilience::{BoxBody, BoxError, EdgeConfig, EdgeLayer, EdgeService};
use http::{header, Request, Response, StatusCode};
use http_body_util::BodyExt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::util::BoxCloneService;
use tower::{Layer, ServiceExt};

pub type Handler = BoxCloneService<Request<()>, Response<String>, BoxError>;

/// Scripted downstream handler.
#[derive(Clone)]
pub struct Backend {
    calls: Arc<AtomicUsize>,
    server_error: Arc<AtomicBool>,
    hard_error: Arc<AtomicBool>,
    delay_ms: Arc<AtomicU64>,
    body_len: usize,
}

impl Backend {
    /// A backend answering `200` with a body of `body_len` bytes.
    pub fn new(body_len: usize) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            server_error: Arc::new(AtomicBool::new(false)),
            hard_error: Arc::new(AtomicBool::new(false)),
            delay_ms: Arc::new(AtomicU64::new(0)),
            body_len,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Answer `500` instead of `200`.
    pub fn set_server_error(&self, on: bool) {
        self.server_error.store(on, Ordering::SeqCst);
    }

    /// Fail with `Err` instead of producing a response.
    pub fn set_hard_error(&self, on: bool) {
        self.hard_error.store(on, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn handler(&self) -> Handler {
        let backend = self.clone();
        BoxCloneService::new(tower::service_fn(move |req: Request<()>| {
            let backend = backend.clone();
            async move {
                backend.calls.fetch_add(1, Ordering::SeqCst);
                let delay = backend.delay_ms.load(Ordering::SeqCst);
                if delay > 0 {
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                if backend.hard_error.load(Ordering::SeqCst) {
                    return Err::<Response<String>, BoxError>("backend exploded".into());
                }
                let mut response = Response::new(payload(req.uri().path(), backend.body_len));
                if backend.server_error.load(Ordering::SeqCst) {
                    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                }
                Ok(response)
            }
        }))
    }

    /// The pipeline built from `config` around this backend.
    pub fn behind(&self, config: EdgeConfig) -> (EdgeLayer, EdgeService<Handler>) {
        let layer = EdgeLayer::builder().config(config).name("test").build();
        let service = layer.layer(self.handler());
        (layer, service)
    }
}

/// Deterministic body of exactly `len` bytes.
pub fn payload(path: &str, len: usize) -> String {
    let unit = format!("{path};");
    unit.repeat(len / unit.len() + 1)[..len].to_string()
}

/// A GET from `client` (sent as `X-Forwarded-For`).
pub fn get(path: &str, client: &str) -> Request<()> {
    Request::get(path)
        .header("x-forwarded-for", client)
        .body(())
        .unwrap()
}

/// A GET from `client` that accepts gzip.
pub fn get_gzip(path: &str, client: &str) -> Request<()> {
    Request::get(path)
        .header("x-forwarded-for", client)
        .header(header::ACCEPT_ENCODING, "gzip")
        .body(())
        .unwrap()
}

/// Sends one request through a clone of `service`.
pub async fn send(service: &EdgeService<Handler>, req: Request<()>) -> Response<BoxBody> {
    send_owned(service.clone(), req).await
}

/// Like [`send`], but consumes the service so the future can be spawned.
pub fn send_owned(
    service: EdgeService<Handler>,
    req: Request<()>,
) -> impl std::future::Future<Output = Response<BoxBody>> + Send + 'static {
    futures::FutureExt::map(service.oneshot(req), |result| match result {
        Ok(response) => response,
        Err(never) => match never {},
    })
}

pub async fn body_bytes(response: Response<BoxBody>) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

pub async fn body_json(response: Response<BoxBody>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
