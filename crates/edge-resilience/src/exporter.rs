//! JSON endpoint for the metrics snapshot.

use edge_resilience_core::body::{json_response, BoxBody};
use edge_resilience_metrics::MetricsRecorder;
use futures::future::{self, Ready};
use http::{Request, Response, StatusCode};
use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;

/// Serves the current [`MetricsSnapshot`](edge_resilience_metrics::MetricsSnapshot)
/// as JSON.
///
/// Mount it on a path outside the pipeline so scrapes are neither rate
/// limited nor counted.
#[derive(Debug, Clone)]
pub struct MetricsExporter {
    recorder: Arc<MetricsRecorder>,
}

impl MetricsExporter {
    pub fn new(recorder: Arc<MetricsRecorder>) -> Self {
        Self { recorder }
    }
}

impl<B> Service<Request<B>> for MetricsExporter {
    type Response = Response<BoxBody>;
    type Error = Infallible;
    type Future = Ready<Result<Response<BoxBody>, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: Request<B>) -> Self::Future {
        let snapshot = self.recorder.snapshot();
        let value = match serde_json::to_value(&snapshot) {
            Ok(value) => value,
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::error!(error = %_e, "failed to serialize metrics snapshot");
                return future::ready(Ok(json_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &serde_json::json!({ "error": "metrics unavailable" }),
                )));
            }
        };
        future::ready(Ok(json_response(StatusCode::OK, &value)))
    }
}
