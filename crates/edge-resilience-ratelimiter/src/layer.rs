use crate::limiter::AdmissionController;
use crate::{RateLimiter, RateLimiterConfig, RateLimiterConfigBuilder};
use std::sync::Arc;
use tower::Layer;

#[cfg(feature = "metrics")]
use metrics::{describe_counter, describe_gauge};
#[cfg(feature = "metrics")]
use std::sync::Once;

#[cfg(feature = "metrics")]
static METRICS_INIT: Once = Once::new();

/// A Tower [`Layer`] applying per-client admission control.
///
/// All services produced by one layer share the same client buckets, so the
/// layer can be applied to many connections' services while every client is
/// still charged against a single bucket.
///
/// # Examples
///
/// ```
/// use edge_resilience_ratelimiter::RateLimiterLayer;
/// use tower::ServiceBuilder;
///
/// # async fn example() {
/// let layer = RateLimiterLayer::builder()
///     .requests_per_second(100.0)
///     .burst(200)
///     .build();
///
/// let service = ServiceBuilder::new()
///     .layer(layer)
///     .service(my_service());
/// # }
/// # fn my_service() -> impl tower::Service<http::Request<()>, Response = http::Response<()>, Error = std::io::Error> {
/// #     tower::service_fn(|_req: http::Request<()>| async move { Ok::<_, std::io::Error>(http::Response::new(())) })
/// # }
/// ```
#[derive(Clone)]
pub struct RateLimiterLayer {
    config: Arc<RateLimiterConfig>,
    controller: Arc<AdmissionController>,
}

impl RateLimiterLayer {
    /// Creates a new `RateLimiterLayer` with the given configuration.
    pub fn new(config: RateLimiterConfig) -> Self {
        let mut controller = AdmissionController::new(config.requests_per_second, config.burst)
            .with_idle_ttl(config.idle_ttl, config.sweep_interval);
        if let Some((source, interval)) = &config.adaptive {
            controller = controller.with_load_source(Arc::clone(source), *interval);
        }

        Self {
            config: Arc::new(config),
            controller: Arc::new(controller),
        }
    }

    /// Creates a new builder for configuring a rate limiter layer.
    pub fn builder() -> RateLimiterConfigBuilder {
        #[cfg(feature = "metrics")]
        {
            METRICS_INIT.call_once(|| {
                describe_counter!(
                    "ratelimiter_calls_total",
                    "Total number of requests seen by the admission controller"
                );
                describe_gauge!(
                    "ratelimiter_tracked_clients",
                    "Number of client buckets currently tracked"
                );
                describe_gauge!(
                    "ratelimiter_effective_rate",
                    "Current refill rate in tokens per second"
                );
            });
        }
        RateLimiterConfigBuilder::new()
    }

    /// The buckets shared by every service this layer produces.
    pub fn controller(&self) -> &Arc<AdmissionController> {
        &self.controller
    }
}

impl<S> Layer<S> for RateLimiterLayer {
    type Service = RateLimiter<S>;

    fn layer(&self, service: S) -> Self::Service {
        RateLimiter::new(
            service,
            Arc::clone(&self.config),
            Arc::clone(&self.controller),
        )
    }
}
