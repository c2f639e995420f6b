//! Circuit breaker for the edge pipeline.
//!
//! A circuit breaker stops hammering an unhealthy downstream by failing fast
//! once it has seen enough consecutive failures, then cautiously probing for
//! recovery.
//!
//! ## States
//! - **Closed**: Normal operation. Each failure increments a consecutive
//!   failure counter, any success resets it; reaching the threshold opens the
//!   circuit.
//! - **Open**: Calls are rejected with [`CircuitOpen`] without touching the
//!   downstream until the cooldown has passed since the last failure. The next
//!   call after that moves the circuit to half-open and is the first probe.
//! - **Half-Open**: At most `half_open_max_calls` probes are admitted. That
//!   many successes close the circuit; any failure reopens it and restarts the
//!   cooldown.
//!
//! An outcome is a failure when the downstream returns `Err` or a response
//! with a 5xx status, unless a custom [`FailureClassifier`] says otherwise.
//!
//! ## Usage
//!
//! ```rust
//! use edge_resilience_circuitbreaker::{CircuitBreakerLayer, CircuitState};
//! use http::{Request, Response, StatusCode};
//! use tower::{service_fn, Layer, Service, ServiceExt};
//!
//! # async fn example() {
//! let layer = CircuitBreakerLayer::builder()
//!     .failure_threshold(2)
//!     .name("orders")
//!     .build();
//!
//! let mut service = layer.layer(service_fn(|_req: Request<()>| async move {
//!     let mut response = Response::new(());
//!     *response.status_mut() = StatusCode::BAD_GATEWAY;
//!     Ok::<_, std::io::Error>(response)
//! }));
//!
//! for _ in 0..2 {
//!     let _ = service.ready().await.unwrap().call(Request::new(())).await;
//! }
//! assert_eq!(service.circuit().state(), CircuitState::Open);
//! # }
//! ```

mod circuit;
mod classifier;
mod config;
mod events;
mod layer;

pub use circuit::{Circuit, CircuitMetrics, CircuitState};
pub use classifier::{FailureClassifier, FnClassifier, ServerErrorClassifier};
pub use config::{CircuitBreakerConfig, CircuitBreakerConfigBuilder};
pub use edge_resilience_core::CircuitOpen;
pub use events::CircuitBreakerEvent;
pub use layer::CircuitBreakerLayer;

use edge_resilience_core::BoxError;
use futures::future::{self, BoxFuture, FutureExt};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;

#[cfg(feature = "metrics")]
use metrics::counter;

/// A Tower Service that applies circuit breaker logic to an inner service.
///
/// # Type Parameters
///
/// - `S`: The inner service type
/// - `C`: The failure classifier type
pub struct CircuitBreaker<S, C = ServerErrorClassifier> {
    inner: S,
    config: Arc<CircuitBreakerConfig<C>>,
    circuit: Arc<Circuit>,
}

impl<S, C> CircuitBreaker<S, C> {
    pub(crate) fn new(inner: S, config: Arc<CircuitBreakerConfig<C>>, circuit: Arc<Circuit>) -> Self {
        Self {
            inner,
            config,
            circuit,
        }
    }

    /// The shared state machine.
    pub fn circuit(&self) -> &Arc<Circuit> {
        &self.circuit
    }

    /// Returns "healthy", "degraded" or "unhealthy" for readiness probes.
    pub fn health_status(&self) -> &'static str {
        self.circuit.health_status()
    }
}

impl<S, C> Clone for CircuitBreaker<S, C>
where
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            config: Arc::clone(&self.config),
            circuit: Arc::clone(&self.circuit),
        }
    }
}

/// Ensures a half-open probe slot is handed back if the call's future is
/// dropped before an outcome is recorded.
struct CallGuard {
    circuit: Arc<Circuit>,
    generation: u64,
    finished: bool,
}

impl CallGuard {
    fn finish(mut self, failure: bool) {
        self.finished = true;
        self.circuit.record_outcome(self.generation, failure);
    }
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.circuit.release(self.generation);
        }
    }
}

impl<S, C, Req> Service<Req> for CircuitBreaker<S, C>
where
    S: Service<Req>,
    S::Response: Send + 'static,
    S::Error: Into<BoxError>,
    S::Future: Send + 'static,
    C: FailureClassifier<S::Response, BoxError> + 'static,
{
    type Response = S::Response;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<S::Response, BoxError>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        if !self.config.enabled {
            return self.inner.call(req).map(|r| r.map_err(Into::into)).boxed();
        }

        let Some(generation) = self.circuit.acquire() else {
            #[cfg(feature = "tracing")]
            tracing::trace!(breaker = %self.config.name, "circuit breaker rejected call (circuit open)");

            #[cfg(feature = "metrics")]
            counter!("circuitbreaker_calls_total", "circuitbreaker" => self.config.name.clone(), "outcome" => "rejected").increment(1);

            let err: BoxError = Box::new(CircuitOpen::new(self.config.name.clone()));
            return future::ready(Err(err)).boxed();
        };

        #[cfg(feature = "tracing")]
        tracing::trace!(breaker = %self.config.name, "circuit breaker permitted call");

        let guard = CallGuard {
            circuit: Arc::clone(&self.circuit),
            generation,
            finished: false,
        };
        let config = Arc::clone(&self.config);
        let fut = self.inner.call(req);

        Box::pin(async move {
            let result: Result<S::Response, BoxError> = fut.await.map_err(Into::into);
            guard.finish(config.failure_classifier.classify(&result));
            result
        })
    }
}
