//! Latency and outcome recording for the edge pipeline.
//!
//! [`Metrics`] sits directly in front of the handler. For every call it
//! measures the time until the handler produced a response (or failed) and
//! records it in a shared [`MetricsRecorder`]:
//!
//! - a request counter
//! - an error counter, for `Err` results and 5xx responses
//! - total and maximum latency
//! - a fixed-bucket [`LatencyHistogram`] used for percentile estimates
//!
//! [`MetricsRecorder::snapshot`] gathers everything into a serializable
//! [`MetricsSnapshot`].
//!
//! # Examples
//!
//! ```
//! use edge_resilience_metrics::MetricsLayer;
//! use http::{Request, Response, StatusCode};
//! use tower::{Service, ServiceBuilder, ServiceExt};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let layer = MetricsLayer::builder().buckets([5, 50, 500]).build();
//! let recorder = layer.recorder().clone();
//!
//! let mut service = ServiceBuilder::new()
//!     .layer(layer)
//!     .service(tower::service_fn(|_req: Request<()>| async {
//!         let mut response = Response::new(());
//!         *response.status_mut() = StatusCode::BAD_GATEWAY;
//!         Ok::<_, std::io::Error>(response)
//!     }));
//!
//! service.ready().await?.call(Request::new(())).await?;
//! let snapshot = recorder.snapshot();
//! assert_eq!(snapshot.request_count, 1);
//! assert_eq!(snapshot.error_count, 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `metrics`: also emit `edge_requests_total` and
//!   `edge_request_duration_seconds` through the `metrics` facade
//! - `tracing`: log each recorded request at trace level

mod config;
mod histogram;
mod layer;
mod recorder;

pub use config::{MetricsConfig, MetricsConfigBuilder};
pub use histogram::{HistogramError, LatencyHistogram, DEFAULT_BOUNDS_MS};
pub use layer::MetricsLayer;
pub use recorder::{BytesSavedSource, MetricsRecorder, MetricsSnapshot};

use futures::future::BoxFuture;
use http::{Request, Response};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::Instant;
use tower::Service;

#[cfg(feature = "metrics")]
use metrics::{counter, histogram};

/// A Tower [`Service`] that records latency and outcome of each call.
pub struct Metrics<S> {
    inner: S,
    config: Arc<MetricsConfig>,
    recorder: Arc<MetricsRecorder>,
}

impl<S> Metrics<S> {
    pub(crate) fn new(inner: S, config: Arc<MetricsConfig>, recorder: Arc<MetricsRecorder>) -> Self {
        Self {
            inner,
            config,
            recorder,
        }
    }

    /// The recorder shared with the layer.
    pub fn recorder(&self) -> &Arc<MetricsRecorder> {
        &self.recorder
    }
}

impl<S> Clone for Metrics<S>
where
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            config: Arc::clone(&self.config),
            recorder: Arc::clone(&self.recorder),
        }
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for Metrics<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Response<ResBody>, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let future = self.inner.call(req);
        if !self.config.enabled {
            return Box::pin(future);
        }

        let config = Arc::clone(&self.config);
        let recorder = Arc::clone(&self.recorder);
        let start = Instant::now();

        Box::pin(async move {
            let result = future.await;
            let is_error = match &result {
                Ok(response) => response.status().is_server_error(),
                Err(_) => true,
            };
            record(&config, &recorder, start.elapsed(), is_error);
            result
        })
    }
}

fn record(config: &MetricsConfig, recorder: &MetricsRecorder, latency: Duration, is_error: bool) {
    recorder.record(latency, is_error);

    #[cfg(feature = "metrics")]
    {
        let outcome = if is_error { "error" } else { "success" };
        counter!("edge_requests_total", "recorder" => config.name.clone(), "outcome" => outcome)
            .increment(1);
        histogram!("edge_request_duration_seconds", "recorder" => config.name.clone())
            .record(latency.as_secs_f64());
    }

    #[cfg(feature = "tracing")]
    tracing::trace!(
        recorder = %config.name,
        latency_ms = latency.as_secs_f64() * 1000.0,
        is_error,
        "request recorded"
    );

    #[cfg(not(any(feature = "metrics", feature = "tracing")))]
    let _ = config;
}
