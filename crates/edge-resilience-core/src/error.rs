//! Error taxonomy for the edge pipeline.
//!
//! Stages compose as ordinary tower services whose error type is [`BoxError`].
//! Rejections raised by the pipeline itself are small concrete types
//! ([`RateLimited`], [`CircuitOpen`], [`LeaderCancelled`]) that travel boxed
//! through the outer layers untouched. At the HTTP boundary
//! [`EdgeError::classify`] recovers the concrete type by downcasting, and
//! [`EdgeError::into_response`] renders the stable JSON shape clients rely on:
//!
//! | Error | Status | Body |
//! |---|---|---|
//! | [`RateLimited`] | 429 | `{"error": "Rate limit exceeded. Please try again later."}` |
//! | [`CircuitOpen`] | 503 | `{"error": "Service temporarily unavailable (circuit breaker open)"}` |
//! | [`LeaderCancelled`] | 503 | `{"error": "Upstream request was cancelled. Please retry."}` |
//! | [`Coalesced`] | 500 | `{"error": "<display of the leader's error>"}` |
//! | anything else | 500 | `{"error": "<display of the handler error>"}` |
//!
//! # Example
//!
//! ```
//! use edge_resilience_core::{BoxError, EdgeError, RateLimited};
//! use http::StatusCode;
//!
//! let err: BoxError = Box::new(RateLimited::new("10.0.0.1", None));
//! let classified = EdgeError::classify(err);
//! assert!(classified.is_rate_limited());
//! assert_eq!(classified.status(), StatusCode::TOO_MANY_REQUESTS);
//! ```

use crate::body::{json_response, BoxBody};
use http::{header, HeaderValue, Response, StatusCode};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Boxed error used between pipeline stages.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Body message for admission rejections.
pub const RATE_LIMITED_MESSAGE: &str = "Rate limit exceeded. Please try again later.";

/// Body message for circuit-open rejections.
pub const CIRCUIT_OPEN_MESSAGE: &str = "Service temporarily unavailable (circuit breaker open)";

/// Body message when a coalesced leader vanished before producing a result.
pub const LEADER_CANCELLED_MESSAGE: &str = "Upstream request was cancelled. Please retry.";

/// The admission controller refused the request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("rate limit exceeded for client {client}")]
pub struct RateLimited {
    /// Identity of the throttled client.
    pub client: String,
    /// Time until the client's bucket holds a whole token again.
    pub retry_after: Option<Duration>,
}

impl RateLimited {
    /// Creates a rejection for `client`.
    pub fn new(client: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self {
            client: client.into(),
            retry_after,
        }
    }
}

/// The circuit breaker refused the request without calling downstream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("circuit breaker {name} is open; call not permitted")]
pub struct CircuitOpen {
    /// Name of the breaker that rejected the call.
    pub name: String,
}

impl CircuitOpen {
    /// Creates a rejection from the breaker called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A coalesced waiter lost its leader before a result was broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("coalesced leader request was cancelled before completing")]
pub struct LeaderCancelled;

/// A leader's failure replayed to a coalesced waiter.
///
/// Every waiter gets its own value sharing the leader's error, so `Display`
/// and `source()` match what the leader saw.
#[derive(Clone)]
pub struct Coalesced {
    inner: Arc<dyn std::error::Error + Send + Sync>,
}

impl Coalesced {
    /// Shares `err` with any number of waiters.
    pub fn new(err: BoxError) -> Self {
        Self { inner: Arc::from(err) }
    }

    /// The leader's error.
    pub fn leader_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        &*self.inner
    }
}

impl fmt::Debug for Coalesced {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Coalesced").field(&self.inner).finish()
    }
}

impl fmt::Display for Coalesced {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl std::error::Error for Coalesced {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

/// Classified view of an error leaving the pipeline.
#[derive(Debug, Error)]
pub enum EdgeError {
    /// Admission control rejected the request.
    #[error(transparent)]
    RateLimited(#[from] RateLimited),
    /// The circuit breaker is open.
    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpen),
    /// A coalesced leader was dropped mid-flight.
    #[error(transparent)]
    LeaderCancelled(#[from] LeaderCancelled),
    /// A coalesced waiter received the leader's failure.
    #[error(transparent)]
    Coalesced(#[from] Coalesced),
    /// The business handler (or a coalesced replay of it) failed.
    #[error("handler error: {0}")]
    Handler(BoxError),
}

impl EdgeError {
    /// Recovers the concrete rejection type from a boxed stage error.
    pub fn classify(err: BoxError) -> Self {
        let err = match err.downcast::<RateLimited>() {
            Ok(e) => return EdgeError::RateLimited(*e),
            Err(e) => e,
        };
        let err = match err.downcast::<CircuitOpen>() {
            Ok(e) => return EdgeError::CircuitOpen(*e),
            Err(e) => e,
        };
        let err = match err.downcast::<LeaderCancelled>() {
            Ok(e) => return EdgeError::LeaderCancelled(*e),
            Err(e) => e,
        };
        match err.downcast::<Coalesced>() {
            Ok(e) => EdgeError::Coalesced(*e),
            Err(e) => EdgeError::Handler(e),
        }
    }

    /// Returns true for admission rejections.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, EdgeError::RateLimited(_))
    }

    /// Returns true for circuit-open rejections.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, EdgeError::CircuitOpen(_))
    }

    /// Returns true when the handler failed, directly or via a coalesced leader.
    pub fn is_handler(&self) -> bool {
        matches!(self, EdgeError::Handler(_) | EdgeError::Coalesced(_))
    }

    /// HTTP status used when rendering this error.
    pub fn status(&self) -> StatusCode {
        match self {
            EdgeError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            EdgeError::CircuitOpen(_) | EdgeError::LeaderCancelled(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            EdgeError::Coalesced(_) | EdgeError::Handler(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Client-facing message placed in the JSON `error` field.
    pub fn message(&self) -> String {
        match self {
            EdgeError::RateLimited(_) => RATE_LIMITED_MESSAGE.to_string(),
            EdgeError::CircuitOpen(_) => CIRCUIT_OPEN_MESSAGE.to_string(),
            EdgeError::LeaderCancelled(_) => LEADER_CANCELLED_MESSAGE.to_string(),
            EdgeError::Coalesced(e) => e.to_string(),
            EdgeError::Handler(e) => e.to_string(),
        }
    }

    /// Renders the error as a structured JSON response.
    pub fn into_response(self) -> Response<BoxBody> {
        let mut response = json_response(
            self.status(),
            &serde_json::json!({ "error": self.message() }),
        );

        if let EdgeError::RateLimited(RateLimited {
            retry_after: Some(wait),
            ..
        }) = &self
        {
            let secs = wait
                .as_secs()
                .saturating_add(u64::from(wait.subsec_nanos() > 0));
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs.max(1)));
        }

        #[cfg(feature = "tracing")]
        if self.is_handler() {
            tracing::warn!(error = %self, "handler error surfaced as 500");
        }

        response
    }
}
