use crate::classifier::{FnClassifier, ServerErrorClassifier};
use crate::events::CircuitBreakerEvent;
use crate::CircuitState;
use edge_resilience_core::events::{EventListeners, FnListener};
use std::time::Duration;

/// Configuration for the circuit breaker.
///
/// `C` is the failure classifier; see [`crate::FailureClassifier`].
pub struct CircuitBreakerConfig<C = ServerErrorClassifier> {
    pub(crate) failure_threshold: u32,
    pub(crate) cooldown: Duration,
    pub(crate) half_open_max_calls: u32,
    pub(crate) failure_classifier: C,
    pub(crate) enabled: bool,
    pub(crate) event_listeners: EventListeners<CircuitBreakerEvent>,
    pub(crate) name: String,
}

impl CircuitBreakerConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> CircuitBreakerConfigBuilder {
        crate::CircuitBreakerLayer::builder()
    }
}

/// Builder for [`CircuitBreakerConfig`].
pub struct CircuitBreakerConfigBuilder<C = ServerErrorClassifier> {
    failure_threshold: u32,
    cooldown: Duration,
    half_open_max_calls: u32,
    failure_classifier: C,
    enabled: bool,
    event_listeners: EventListeners<CircuitBreakerEvent>,
    name: String,
}

impl Default for CircuitBreakerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CircuitBreakerConfigBuilder {
    /// Creates a new builder with defaults.
    ///
    /// Defaults:
    /// - failure_threshold: 5 consecutive failures
    /// - cooldown: 30 seconds
    /// - half_open_max_calls: 3
    /// - classifier: [`ServerErrorClassifier`] (errors and 5xx responses)
    /// - name: `"<unnamed>"`
    pub fn new() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
            half_open_max_calls: 3,
            failure_classifier: ServerErrorClassifier,
            enabled: true,
            event_listeners: EventListeners::new(),
            name: "<unnamed>".to_string(),
        }
    }
}

impl<C> CircuitBreakerConfigBuilder<C> {
    /// Sets how many failures in a row open the circuit.
    pub fn failure_threshold(mut self, n: u32) -> Self {
        self.failure_threshold = n;
        self
    }

    /// Sets how long the circuit stays open before probing.
    pub fn cooldown(mut self, duration: Duration) -> Self {
        self.cooldown = duration;
        self
    }

    /// Sets the number of probes admitted while half-open; that many
    /// successes close the circuit again.
    pub fn half_open_max_calls(mut self, n: u32) -> Self {
        self.half_open_max_calls = n;
        self
    }

    /// Turns failure isolation on or off.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the name for this breaker (used in events, logs and metrics).
    pub fn name<N: Into<String>>(mut self, n: N) -> Self {
        self.name = n.into();
        self
    }

    /// Classifies outcomes with a closure instead of the default.
    ///
    /// # Example
    /// ```rust
    /// use edge_resilience_circuitbreaker::CircuitBreakerLayer;
    /// use edge_resilience_core::BoxError;
    /// use http::{Response, StatusCode};
    ///
    /// // 500s are application bugs; only 502-504 mean the downstream is unhealthy.
    /// let layer = CircuitBreakerLayer::builder()
    ///     .failure_classifier(|result: &Result<Response<()>, BoxError>| match result {
    ///         Ok(response) => matches!(response.status().as_u16(), 502..=504),
    ///         Err(_) => true,
    ///     })
    ///     .build();
    /// ```
    pub fn failure_classifier<F>(self, f: F) -> CircuitBreakerConfigBuilder<FnClassifier<F>> {
        self.classifier(FnClassifier::new(f))
    }

    /// Uses any [`crate::FailureClassifier`] implementation.
    pub fn classifier<C2>(self, classifier: C2) -> CircuitBreakerConfigBuilder<C2> {
        CircuitBreakerConfigBuilder {
            failure_threshold: self.failure_threshold,
            cooldown: self.cooldown,
            half_open_max_calls: self.half_open_max_calls,
            failure_classifier: classifier,
            enabled: self.enabled,
            event_listeners: self.event_listeners,
            name: self.name,
        }
    }

    /// Registers a callback when the circuit breaker transitions between states.
    ///
    /// # Callback Signature
    /// `Fn(CircuitState, CircuitState)` - the state left and the state entered.
    ///
    /// # Example
    /// ```rust
    /// use edge_resilience_circuitbreaker::{CircuitBreakerLayer, CircuitState};
    ///
    /// let layer = CircuitBreakerLayer::builder()
    ///     .on_state_transition(|from, to| {
    ///         if to == CircuitState::Open {
    ///             eprintln!("downstream unhealthy ({from:?} -> {to:?})");
    ///         }
    ///     })
    ///     .build();
    /// ```
    pub fn on_state_transition<F>(mut self, f: F) -> Self
    where
        F: Fn(CircuitState, CircuitState) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &CircuitBreakerEvent| {
                if let CircuitBreakerEvent::StateTransition {
                    from_state,
                    to_state,
                    ..
                } = event
                {
                    f(*from_state, *to_state);
                }
            }));
        self
    }

    /// Registers a callback when a call is permitted, with the state it was
    /// permitted in.
    pub fn on_call_permitted<F>(mut self, f: F) -> Self
    where
        F: Fn(CircuitState) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &CircuitBreakerEvent| {
                if let CircuitBreakerEvent::CallPermitted { state, .. } = event {
                    f(*state);
                }
            }));
        self
    }

    /// Registers a callback when a call is rejected without reaching the
    /// downstream.
    pub fn on_call_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &CircuitBreakerEvent| {
                if let CircuitBreakerEvent::CallRejected { .. } = event {
                    f();
                }
            }));
        self
    }

    /// Registers a callback when a success is recorded.
    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: Fn(CircuitState) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &CircuitBreakerEvent| {
                if let CircuitBreakerEvent::SuccessRecorded { state, .. } = event {
                    f(*state);
                }
            }));
        self
    }

    /// Registers a callback when a failure is recorded.
    pub fn on_failure<F>(mut self, f: F) -> Self
    where
        F: Fn(CircuitState) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &CircuitBreakerEvent| {
                if let CircuitBreakerEvent::FailureRecorded { state, .. } = event {
                    f(*state);
                }
            }));
        self
    }

    /// Builds the configuration without wrapping it in a layer.
    pub fn into_config(self) -> CircuitBreakerConfig<C> {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            cooldown: self.cooldown,
            half_open_max_calls: self.half_open_max_calls,
            failure_classifier: self.failure_classifier,
            enabled: self.enabled,
            event_listeners: self.event_listeners,
            name: self.name,
        }
    }

    /// Builds the circuit breaker layer.
    pub fn build(self) -> crate::CircuitBreakerLayer<C> {
        crate::CircuitBreakerLayer::new(self.into_config())
    }
}
