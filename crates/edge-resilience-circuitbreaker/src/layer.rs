use crate::circuit::Circuit;
use crate::classifier::ServerErrorClassifier;
use crate::config::{CircuitBreakerConfig, CircuitBreakerConfigBuilder};
use crate::CircuitBreaker;
use std::sync::Arc;
use tower::Layer;

#[cfg(feature = "metrics")]
use metrics::{describe_counter, describe_gauge};
#[cfg(feature = "metrics")]
use std::sync::Once;

#[cfg(feature = "metrics")]
static METRICS_INIT: Once = Once::new();

/// A Tower Layer that applies circuit breaker behavior to an inner service.
///
/// The type parameter `C` is the failure classifier type:
/// - `CircuitBreakerLayer<ServerErrorClassifier>` - errors and 5xx responses are failures
/// - `CircuitBreakerLayer<FnClassifier<F>>` - uses a custom classifier function
///
/// Every service produced by one layer shares a single [`Circuit`].
///
/// ```rust
/// use edge_resilience_circuitbreaker::CircuitBreakerLayer;
/// use http::{Request, Response};
/// use tower::{service_fn, ServiceBuilder};
/// use std::time::Duration;
///
/// let layer = CircuitBreakerLayer::builder()
///     .failure_threshold(5)
///     .cooldown(Duration::from_secs(30))
///     .build();
///
/// let service = ServiceBuilder::new()
///     .layer(layer)
///     .service(service_fn(|_req: Request<()>| async move {
///         Ok::<_, std::io::Error>(Response::new(()))
///     }));
/// ```
pub struct CircuitBreakerLayer<C = ServerErrorClassifier> {
    config: Arc<CircuitBreakerConfig<C>>,
    circuit: Arc<Circuit>,
}

impl<C> Clone for CircuitBreakerLayer<C> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            circuit: Arc::clone(&self.circuit),
        }
    }
}

impl CircuitBreakerLayer {
    /// Creates a new builder with the default classifier.
    pub fn builder() -> CircuitBreakerConfigBuilder {
        #[cfg(feature = "metrics")]
        {
            METRICS_INIT.call_once(|| {
                describe_counter!(
                    "circuitbreaker_calls_total",
                    "Total number of calls through the circuit breaker"
                );
                describe_counter!(
                    "circuitbreaker_transitions_total",
                    "Total number of circuit breaker state transitions"
                );
                describe_gauge!(
                    "circuitbreaker_state",
                    "Current state of the circuit breaker (0 closed, 1 open, 2 half-open)"
                );
            });
        }
        CircuitBreakerConfigBuilder::new()
    }
}

impl<C> CircuitBreakerLayer<C> {
    /// Creates a new `CircuitBreakerLayer` from the given configuration.
    pub fn new(config: CircuitBreakerConfig<C>) -> Self {
        let circuit = Circuit::new(
            config.failure_threshold,
            config.cooldown,
            config.half_open_max_calls,
        )
        .with_observers(config.name.clone(), config.event_listeners.clone());

        Self {
            config: Arc::new(config),
            circuit: Arc::new(circuit),
        }
    }

    /// The circuit shared by every service this layer produces.
    pub fn circuit(&self) -> &Arc<Circuit> {
        &self.circuit
    }
}

impl<S, C> Layer<S> for CircuitBreakerLayer<C> {
    type Service = CircuitBreaker<S, C>;

    fn layer(&self, service: S) -> Self::Service {
        CircuitBreaker::new(service, Arc::clone(&self.config), Arc::clone(&self.circuit))
    }
}
