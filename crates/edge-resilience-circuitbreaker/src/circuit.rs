use crate::events::CircuitBreakerEvent;
use edge_resilience_core::EventListeners;
#[cfg(feature = "metrics")]
use metrics::{counter, gauge};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Represents the state of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CircuitState {
    /// The circuit is closed and calls are allowed.
    Closed = 0,
    /// The circuit is open and calls are rejected.
    Open = 1,
    /// The circuit is half-open and a limited number of probes are allowed.
    HalfOpen = 2,
}

impl CircuitState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }

    /// Name used in logs and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            CircuitState::Closed => "Closed",
            CircuitState::Open => "Open",
            CircuitState::HalfOpen => "HalfOpen",
        }
    }
}

/// Point-in-time view of the breaker's counters.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitMetrics {
    /// Current state.
    pub state: CircuitState,
    /// Failures in a row while closed.
    pub consecutive_failures: u32,
    /// Probes admitted in the current half-open episode.
    pub probes_issued: u32,
    /// Probes that succeeded in the current half-open episode.
    pub probe_successes: u32,
    /// Time since the last state transition.
    pub time_since_state_change: Duration,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Closed { consecutive_failures: u32 },
    Open { since: Instant },
    HalfOpen { issued: u32, successes: u32 },
}

impl Phase {
    fn state(&self) -> CircuitState {
        match self {
            Phase::Closed { .. } => CircuitState::Closed,
            Phase::Open { .. } => CircuitState::Open,
            Phase::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }
}

struct Inner {
    phase: Phase,
    last_failure: Option<Instant>,
    last_state_change: Instant,
    // Bumped on every transition so late outcomes from an earlier phase can
    // be told apart from outcomes of calls admitted in the current one.
    generation: u64,
}

/// Events produced while the lock was held, delivered after it is released.
#[derive(Default)]
struct Pending {
    transition: Option<(CircuitState, CircuitState)>,
    event: Option<CircuitBreakerEvent>,
}

/// The shared state machine guarding one downstream.
///
/// All mutation happens under a single lock; [`state`](Circuit::state) reads
/// an atomic mirror and never blocks.
pub struct Circuit {
    inner: Mutex<Inner>,
    state_atomic: AtomicU8,
    failure_threshold: u32,
    cooldown: Duration,
    half_open_max_calls: u32,
    name: String,
    event_listeners: EventListeners<CircuitBreakerEvent>,
}

impl Circuit {
    /// Creates a closed circuit that opens after `failure_threshold`
    /// consecutive failures, stays open for `cooldown`, then closes again
    /// after `half_open_max_calls` successful probes.
    pub fn new(failure_threshold: u32, cooldown: Duration, half_open_max_calls: u32) -> Self {
        Self {
            inner: Mutex::new(Inner {
                phase: Phase::Closed {
                    consecutive_failures: 0,
                },
                last_failure: None,
                last_state_change: Instant::now(),
                generation: 0,
            }),
            state_atomic: AtomicU8::new(CircuitState::Closed as u8),
            failure_threshold: failure_threshold.max(1),
            cooldown,
            half_open_max_calls: half_open_max_calls.max(1),
            name: "<unnamed>".to_string(),
            event_listeners: EventListeners::new(),
        }
    }

    pub(crate) fn with_observers(
        mut self,
        name: String,
        event_listeners: EventListeners<CircuitBreakerEvent>,
    ) -> Self {
        self.name = name;
        self.event_listeners = event_listeners;
        self
    }

    /// Current state without taking the lock.
    ///
    /// An open circuit whose cooldown has elapsed still reports `Open` until
    /// the next call moves it to half-open.
    pub fn state(&self) -> CircuitState {
        CircuitState::from_u8(self.state_atomic.load(Ordering::Acquire))
    }

    /// Returns whether the circuit is currently open.
    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    /// Returns "healthy" when closed, "degraded" when half-open and
    /// "unhealthy" when open.
    pub fn health_status(&self) -> &'static str {
        match self.state() {
            CircuitState::Closed => "healthy",
            CircuitState::HalfOpen => "degraded",
            CircuitState::Open => "unhealthy",
        }
    }

    /// When the most recent failure was recorded.
    pub fn last_failure(&self) -> Option<Instant> {
        self.inner.lock().last_failure
    }

    /// Returns a snapshot of the breaker's counters.
    pub fn metrics(&self) -> CircuitMetrics {
        let inner = self.inner.lock();
        let (consecutive_failures, probes_issued, probe_successes) = match inner.phase {
            Phase::Closed {
                consecutive_failures,
            } => (consecutive_failures, 0, 0),
            Phase::Open { .. } => (0, 0, 0),
            Phase::HalfOpen { issued, successes } => (0, issued, successes),
        };
        CircuitMetrics {
            state: inner.phase.state(),
            consecutive_failures,
            probes_issued,
            probe_successes,
            time_since_state_change: Instant::now()
                .saturating_duration_since(inner.last_state_change),
        }
    }

    /// Asks whether a call may proceed, charging a half-open probe if so.
    pub fn can_execute(&self) -> bool {
        self.acquire().is_some()
    }

    /// Records a successful call against the current state.
    pub fn record_success(&self) {
        let mut pending = Pending::default();
        {
            let mut inner = self.inner.lock();
            self.on_success(&mut inner, &mut pending);
        }
        self.flush(pending);
    }

    /// Records a failed call against the current state.
    pub fn record_failure(&self) {
        let mut pending = Pending::default();
        {
            let mut inner = self.inner.lock();
            self.on_failure(&mut inner, &mut pending);
        }
        self.flush(pending);
    }

    /// Forces the circuit open, starting a fresh cooldown.
    pub fn force_open(&self) {
        let mut pending = Pending::default();
        {
            let mut inner = self.inner.lock();
            self.transition(
                &mut inner,
                Phase::Open {
                    since: Instant::now(),
                },
                &mut pending,
            );
        }
        self.flush(pending);
    }

    /// Closes the circuit and clears all counters.
    pub fn reset(&self) {
        let mut pending = Pending::default();
        {
            let mut inner = self.inner.lock();
            self.transition(
                &mut inner,
                Phase::Closed {
                    consecutive_failures: 0,
                },
                &mut pending,
            );
            inner.last_failure = None;
        }
        self.flush(pending);
    }

    /// Admits a call, returning the generation it was admitted under.
    pub(crate) fn acquire(&self) -> Option<u64> {
        let now = Instant::now();
        let mut pending = Pending::default();

        let admitted = {
            let mut inner = self.inner.lock();
            let phase = inner.phase;
            let admitted = match phase {
                Phase::Closed { .. } => true,
                Phase::Open { since } => {
                    let cooled = now.saturating_duration_since(since) >= self.cooldown;
                    if cooled {
                        // The call that notices the cooldown has elapsed is the first probe.
                        let probe = Phase::HalfOpen {
                            issued: 1,
                            successes: 0,
                        };
                        self.transition(&mut inner, probe, &mut pending);
                    }
                    cooled
                }
                Phase::HalfOpen { issued, successes } => {
                    let permitted = issued < self.half_open_max_calls;
                    if permitted {
                        inner.phase = Phase::HalfOpen {
                            issued: issued + 1,
                            successes,
                        };
                    }
                    permitted
                }
            };

            if !self.event_listeners.is_empty() {
                pending.event = Some(if admitted {
                    CircuitBreakerEvent::CallPermitted {
                        pattern_name: self.name.clone(),
                        timestamp: now,
                        state: inner.phase.state(),
                    }
                } else {
                    CircuitBreakerEvent::CallRejected {
                        pattern_name: self.name.clone(),
                        timestamp: now,
                    }
                });
            }

            admitted.then_some(inner.generation)
        };

        self.flush(pending);
        admitted
    }

    /// Records the outcome of a call admitted under `generation`.
    ///
    /// Outcomes of calls admitted before the last transition are dropped.
    pub(crate) fn record_outcome(&self, generation: u64, failure: bool) {
        let mut pending = Pending::default();
        {
            let mut inner = self.inner.lock();
            if inner.generation != generation {
                return;
            }
            if failure {
                self.on_failure(&mut inner, &mut pending);
            } else {
                self.on_success(&mut inner, &mut pending);
            }
        }
        self.flush(pending);
    }

    /// Returns an unused half-open probe slot for a call that was dropped
    /// before producing an outcome.
    pub(crate) fn release(&self, generation: u64) {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return;
        }
        let phase = inner.phase;
        if let Phase::HalfOpen { issued, successes } = phase {
            inner.phase = Phase::HalfOpen {
                issued: issued.saturating_sub(1),
                successes,
            };
        }
    }

    fn on_success(&self, inner: &mut Inner, pending: &mut Pending) {
        let state = inner.phase.state();
        match inner.phase {
            Phase::Closed { .. } => {
                inner.phase = Phase::Closed {
                    consecutive_failures: 0,
                };
            }
            Phase::HalfOpen { issued, successes } => {
                let successes = successes + 1;
                let next = if successes >= self.half_open_max_calls {
                    Phase::Closed {
                        consecutive_failures: 0,
                    }
                } else {
                    Phase::HalfOpen { issued, successes }
                };
                self.transition(inner, next, pending);
            }
            Phase::Open { .. } => {}
        }

        #[cfg(feature = "metrics")]
        counter!("circuitbreaker_calls_total", "circuitbreaker" => self.name.clone(), "outcome" => "success").increment(1);

        if !self.event_listeners.is_empty() {
            pending.event = Some(CircuitBreakerEvent::SuccessRecorded {
                pattern_name: self.name.clone(),
                timestamp: Instant::now(),
                state,
            });
        }
    }

    fn on_failure(&self, inner: &mut Inner, pending: &mut Pending) {
        let now = Instant::now();
        let state = inner.phase.state();
        inner.last_failure = Some(now);

        let next = match inner.phase {
            Phase::Closed {
                consecutive_failures,
            } => {
                let consecutive_failures = consecutive_failures + 1;
                if consecutive_failures >= self.failure_threshold {
                    Phase::Open { since: now }
                } else {
                    Phase::Closed {
                        consecutive_failures,
                    }
                }
            }
            // Any failed probe reopens; a late failure while open restarts the cooldown.
            Phase::HalfOpen { .. } | Phase::Open { .. } => Phase::Open { since: now },
        };
        self.transition(inner, next, pending);

        #[cfg(feature = "metrics")]
        counter!("circuitbreaker_calls_total", "circuitbreaker" => self.name.clone(), "outcome" => "failure").increment(1);

        if !self.event_listeners.is_empty() {
            pending.event = Some(CircuitBreakerEvent::FailureRecorded {
                pattern_name: self.name.clone(),
                timestamp: now,
                state,
            });
        }
    }

    fn transition(&self, inner: &mut Inner, to: Phase, pending: &mut Pending) {
        let from_state = inner.phase.state();
        let to_state = to.state();

        inner.phase = to;
        if from_state == to_state {
            return;
        }

        inner.generation = inner.generation.wrapping_add(1);
        inner.last_state_change = Instant::now();
        self.state_atomic.store(to_state as u8, Ordering::Release);
        pending.transition = Some((from_state, to_state));
    }

    fn flush(&self, pending: Pending) {
        if let Some((from_state, to_state)) = pending.transition {
            #[cfg(feature = "tracing")]
            tracing::info!(
                breaker = %self.name,
                from = from_state.as_str(),
                to = to_state.as_str(),
                "Circuit state transition"
            );

            #[cfg(feature = "metrics")]
            {
                counter!(
                    "circuitbreaker_transitions_total",
                    "circuitbreaker" => self.name.clone(),
                    "from" => from_state.as_str(),
                    "to" => to_state.as_str()
                )
                .increment(1);
                gauge!("circuitbreaker_state", "circuitbreaker" => self.name.clone())
                    .set(to_state as u8 as f64);
            }

            self.event_listeners
                .emit(&CircuitBreakerEvent::StateTransition {
                    pattern_name: self.name.clone(),
                    timestamp: Instant::now(),
                    from_state,
                    to_state,
                });
        }

        if let Some(event) = pending.event {
            self.event_listeners.emit(&event);
        }
    }
}

impl std::fmt::Debug for Circuit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Circuit")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("failure_threshold", &self.failure_threshold)
            .field("cooldown", &self.cooldown)
            .field("half_open_max_calls", &self.half_open_max_calls)
            .finish()
    }
}
