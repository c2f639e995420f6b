//! Response compression for the edge pipeline.
//!
//! Responses are gzip-encoded when all of the following hold:
//!
//! - the request's `Accept-Encoding` allows gzip (a quality of zero disables it)
//! - the response does not already carry a `Content-Encoding`
//! - the status is not a client or server error
//! - the body reaches `min_size` bytes (1 KiB by default)
//!
//! The compressor reads body frames until `min_size` bytes are buffered or the
//! body ends. A body that ends short of the threshold is sent as-is; otherwise
//! the buffered prefix and the remainder of the stream are gzip-encoded as
//! they arrive. The decision is made once per response.
//!
//! Encoders come from a bounded [`EncoderPool`] and are reset and returned
//! only after a stream finishes cleanly. Compressed responses get
//! `Content-Encoding: gzip` and `Vary: Accept-Encoding`, and lose any
//! `Content-Length`.
//!
//! # Examples
//!
//! ```
//! use edge_resilience_compression::CompressionLayer;
//! use http::{header, Request, Response};
//! use tower::{Service, ServiceBuilder, ServiceExt};
//!
//! # async fn example() -> Result<(), edge_resilience_core::BoxError> {
//! let layer = CompressionLayer::builder().min_size(256).level(6).build();
//! let stats = layer.stats().clone();
//!
//! let mut service = ServiceBuilder::new()
//!     .layer(layer)
//!     .service(tower::service_fn(|_req: Request<()>| async move {
//!         Ok::<_, std::io::Error>(Response::new("x".repeat(4096)))
//!     }));
//!
//! let request = Request::get("/")
//!     .header(header::ACCEPT_ENCODING, "gzip")
//!     .body(())?;
//! let response = service.ready().await?.call(request).await?;
//! assert_eq!(response.headers()[header::CONTENT_ENCODING], "gzip");
//! # Ok(())
//! # }
//! ```

mod body;
mod config;
mod layer;
mod pool;
mod stats;

pub use body::{CompressionError, GzipBody, PrefixedBody};
pub use config::{CompressionConfig, CompressionConfigBuilder};
pub use layer::CompressionLayer;
pub use pool::{EncoderPool, PooledEncoder};
pub use stats::CompressionStats;

use body::GzipPrelude;
use bytes::{Bytes, BytesMut};
use edge_resilience_core::body::{self as core_body, BoxBody};
use edge_resilience_core::{accepts_gzip, BoxError};
use futures::future::{BoxFuture, FutureExt};
use http::header::{CONTENT_ENCODING, CONTENT_LENGTH, VARY};
use http::{HeaderMap, HeaderValue, Request, Response};
use http_body_util::BodyExt;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;

#[cfg(feature = "metrics")]
use metrics::counter;

/// A Tower [`Service`] that gzip-compresses eligible responses.
pub struct Compression<S> {
    inner: S,
    config: Arc<CompressionConfig>,
    pool: EncoderPool,
    stats: Arc<CompressionStats>,
}

impl<S> Compression<S> {
    pub(crate) fn new(
        inner: S,
        config: Arc<CompressionConfig>,
        pool: EncoderPool,
        stats: Arc<CompressionStats>,
    ) -> Self {
        Self {
            inner,
            config,
            pool,
            stats,
        }
    }

    /// Compression totals shared with the layer.
    pub fn stats(&self) -> &Arc<CompressionStats> {
        &self.stats
    }
}

impl<S> Clone for Compression<S>
where
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            config: Arc::clone(&self.config),
            pool: self.pool.clone(),
            stats: Arc::clone(&self.stats),
        }
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for Compression<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Error: Into<BoxError>,
    S::Future: Send + 'static,
    ResBody: http_body::Body<Data = Bytes> + Send + 'static,
    ResBody::Error: Into<BoxError>,
{
    type Response = Response<BoxBody>;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Response<BoxBody>, BoxError>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let negotiated = self.config.enabled && accepts_gzip(req.headers());
        let future = self.inner.call(req);

        if !negotiated {
            return future
                .map(|result| {
                    result
                        .map(|response| response.map(core_body::boxed))
                        .map_err(Into::into)
                })
                .boxed();
        }

        let config = Arc::clone(&self.config);
        let pool = self.pool.clone();
        let stats = Arc::clone(&self.stats);

        Box::pin(async move {
            let response = future.await.map_err(Into::<BoxError>::into)?;
            compress_response(response, &config, &pool, stats).await
        })
    }
}

fn is_eligible<B>(response: &Response<B>) -> bool {
    let status = response.status();
    !status.is_client_error()
        && !status.is_server_error()
        && !response.headers().contains_key(CONTENT_ENCODING)
}

fn record_outcome(_config: &CompressionConfig, _outcome: &'static str) {
    #[cfg(feature = "metrics")]
    counter!("compression_responses_total", "compressor" => _config.name.clone(), "outcome" => _outcome).increment(1);

    #[cfg(feature = "tracing")]
    tracing::trace!(compressor = %_config.name, outcome = _outcome, "compression decision");
}

fn add_vary(headers: &mut HeaderMap) {
    let present = headers.get_all(VARY).iter().any(|value| {
        value.to_str().is_ok_and(|v| {
            v.split(',')
                .map(str::trim)
                .any(|item| item == "*" || item.eq_ignore_ascii_case("accept-encoding"))
        })
    });
    if !present {
        headers.append(VARY, HeaderValue::from_static("Accept-Encoding"));
    }
}

async fn compress_response<B>(
    response: Response<B>,
    config: &CompressionConfig,
    pool: &EncoderPool,
    stats: Arc<CompressionStats>,
) -> Result<Response<BoxBody>, BoxError>
where
    B: http_body::Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    if !is_eligible(&response) {
        record_outcome(config, "ineligible");
        return Ok(response.map(core_body::boxed));
    }

    let (mut parts, body) = response.into_parts();
    let mut body = core_body::boxed(body);
    let mut prefix = BytesMut::new();
    let mut trailers = None;
    let mut ended = false;

    while prefix.len() < config.min_size {
        let Some(frame) = body.frame().await else {
            ended = true;
            break;
        };
        match frame?.into_data() {
            Ok(data) => prefix.extend_from_slice(&data),
            Err(frame) => {
                trailers = frame.into_trailers().ok();
                ended = true;
                break;
            }
        }
    }
    let prefix = prefix.freeze();

    if ended && prefix.len() < config.min_size {
        record_outcome(config, "below_threshold");
        let body = PrefixedBody::<BoxBody>::new(prefix, None, trailers);
        return Ok(Response::from_parts(parts, core_body::boxed(body)));
    }

    let rest = (!ended).then_some(body);
    match GzipPrelude::begin(pool.acquire(), &prefix) {
        Ok(prelude) => {
            record_outcome(config, "compressed");
            parts.headers.remove(CONTENT_LENGTH);
            parts
                .headers
                .insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
            add_vary(&mut parts.headers);
            let body = prelude.into_body(rest, trailers, stats);
            Ok(Response::from_parts(parts, core_body::boxed(body)))
        }
        Err(_err) => {
            #[cfg(feature = "tracing")]
            tracing::warn!(compressor = %config.name, error = %_err, "gzip failed, sending uncompressed");

            record_outcome(config, "fallback");
            let body = PrefixedBody::new(prefix, rest, trailers);
            Ok(Response::from_parts(parts, core_body::boxed(body)))
        }
    }
}
