//! Per-client admission control for the edge pipeline.
//!
//! Every client identity gets its own token bucket that refills continuously
//! at `requests_per_second` up to `burst` tokens. A request that finds its
//! bucket empty is rejected with [`RateLimited`] before any downstream work
//! happens; the rejection carries a `retry_after` hint that the HTTP boundary
//! turns into a `Retry-After` header.
//!
//! # Features
//!
//! - **Continuous refill**: fractional tokens are kept between requests
//! - **Idle reaping**: buckets unused for the idle TTL are swept periodically
//! - **Adaptive rate**: optional [`LoadSource`] scales the rate down under load
//! - **Event system**: admitted / rejected / rate-adjusted hooks
//!
//! # Examples
//!
//! ```
//! use edge_resilience_ratelimiter::RateLimiterLayer;
//! use http::{Request, Response};
//! use tower::{Service, ServiceBuilder, ServiceExt};
//!
//! # async fn example() -> Result<(), edge_resilience_core::BoxError> {
//! let layer = RateLimiterLayer::builder()
//!     .requests_per_second(10.0)
//!     .burst(10)
//!     .on_rejected(|client, retry_after| {
//!         println!("{client} rate limited, retry in {retry_after:?}");
//!     })
//!     .build();
//!
//! let mut service = ServiceBuilder::new()
//!     .layer(layer)
//!     .service(tower::service_fn(|_req: Request<()>| async move {
//!         Ok::<_, std::io::Error>(Response::new("ok"))
//!     }));
//!
//! let request = Request::builder()
//!     .header("x-forwarded-for", "203.0.113.7")
//!     .body(())?;
//! let response = service.ready().await?.call(request).await?;
//! assert_eq!(*response.body(), "ok");
//! # Ok(())
//! # }
//! ```

mod config;
mod events;
mod layer;
mod limiter;

pub use config::{KeyExtractor, RateLimiterConfig, RateLimiterConfigBuilder};
pub use edge_resilience_core::RateLimited;
pub use events::RateLimiterEvent;
pub use layer::RateLimiterLayer;
pub use limiter::{
    rate_factor, AdmissionController, LoadSource, RateAdjustment, MIN_ADAPTIVE_INTERVAL,
};

use edge_resilience_core::BoxError;
use futures::future::{self, BoxFuture, FutureExt};
use http::Request;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::time::Instant;
use tower::Service;

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// A Tower [`Service`] that applies per-client admission control.
pub struct RateLimiter<S> {
    inner: S,
    config: Arc<RateLimiterConfig>,
    controller: Arc<AdmissionController>,
}

impl<S> RateLimiter<S> {
    /// Creates a new `RateLimiter` charging requests against `controller`.
    pub fn new(
        inner: S,
        config: Arc<RateLimiterConfig>,
        controller: Arc<AdmissionController>,
    ) -> Self {
        Self {
            inner,
            config,
            controller,
        }
    }

    /// The shared client buckets.
    pub fn controller(&self) -> &Arc<AdmissionController> {
        &self.controller
    }

    fn emit(&self, event: impl FnOnce() -> RateLimiterEvent) {
        if !self.config.event_listeners.is_empty() {
            self.config.event_listeners.emit(&event());
        }
    }

    fn refresh_rate(&self) {
        let Some(adjustment) = self.controller.adjust_rate() else {
            return;
        };

        #[cfg(feature = "tracing")]
        tracing::info!(
            limiter = %self.config.name,
            load = adjustment.load,
            previous_rate = adjustment.previous_rate,
            current_rate = adjustment.current_rate,
            "adaptive admission rate changed"
        );

        #[cfg(feature = "metrics")]
        gauge!("ratelimiter_effective_rate", "ratelimiter" => self.config.name.clone())
            .set(adjustment.current_rate);

        self.emit(|| RateLimiterEvent::RateAdjusted {
            pattern_name: self.config.name.clone(),
            timestamp: Instant::now(),
            load: adjustment.load,
            previous_rate: adjustment.previous_rate,
            current_rate: adjustment.current_rate,
        });
    }
}

impl<S> Clone for RateLimiter<S>
where
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            config: Arc::clone(&self.config),
            controller: Arc::clone(&self.controller),
        }
    }
}

impl<S, B> Service<Request<B>> for RateLimiter<S>
where
    S: Service<Request<B>>,
    S::Response: Send + 'static,
    S::Error: Into<BoxError>,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        if !self.config.enabled {
            return self.inner.call(req).map(|r| r.map_err(Into::into)).boxed();
        }

        self.controller.ensure_sweeper();
        self.refresh_rate();

        let client = (self.config.key_extractor)(req.headers(), req.extensions());

        match self.controller.try_admit(&client) {
            Ok(()) => {
                #[cfg(feature = "tracing")]
                tracing::trace!(limiter = %self.config.name, client = %client, "request admitted");

                #[cfg(feature = "metrics")]
                counter!("ratelimiter_calls_total", "ratelimiter" => self.config.name.clone(), "outcome" => "admitted").increment(1);

                self.emit(|| RateLimiterEvent::Admitted {
                    pattern_name: self.config.name.clone(),
                    timestamp: Instant::now(),
                    client: client.clone(),
                });

                self.inner.call(req).map(|r| r.map_err(Into::into)).boxed()
            }
            Err(retry_after) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    limiter = %self.config.name,
                    client = %client,
                    retry_after_ms = retry_after.as_millis() as u64,
                    "request rejected by admission control"
                );

                #[cfg(feature = "metrics")]
                counter!("ratelimiter_calls_total", "ratelimiter" => self.config.name.clone(), "outcome" => "rejected").increment(1);

                self.emit(|| RateLimiterEvent::Rejected {
                    pattern_name: self.config.name.clone(),
                    timestamp: Instant::now(),
                    client: client.clone(),
                    retry_after,
                });

                let err: BoxError = Box::new(RateLimited::new(client, Some(retry_after)));
                future::ready(Err(err)).boxed()
            }
        }
    }
}
