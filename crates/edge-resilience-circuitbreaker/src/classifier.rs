//! Failure classification for circuit breaker decisions.
//!
//! This module provides the [`FailureClassifier`] trait and implementations
//! for determining whether a downstream outcome should count against the
//! breaker.

use http::Response;
use std::sync::Arc;

/// Decides whether an outcome is a failure.
///
/// # Type Parameters
///
/// - `Res`: The success response type
/// - `Err`: The error type
pub trait FailureClassifier<Res, Err>: Send + Sync {
    /// Returns `true` if the result counts toward opening the circuit.
    fn classify(&self, result: &Result<Res, Err>) -> bool;
}

/// Treats any error, and any response with a 5xx status, as a failure.
///
/// # Example
///
/// ```rust
/// use edge_resilience_circuitbreaker::{FailureClassifier, ServerErrorClassifier};
/// use http::{Response, StatusCode};
///
/// let classifier = ServerErrorClassifier;
/// let ok: Result<Response<()>, ()> = Ok(Response::new(()));
/// assert!(!classifier.classify(&ok));
///
/// let mut unavailable = Response::new(());
/// *unavailable.status_mut() = StatusCode::BAD_GATEWAY;
/// assert!(classifier.classify(&Ok::<_, ()>(unavailable)));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ServerErrorClassifier;

impl<B, Err> FailureClassifier<Response<B>, Err> for ServerErrorClassifier {
    fn classify(&self, result: &Result<Response<B>, Err>) -> bool {
        match result {
            Ok(response) => response.status().is_server_error(),
            Err(_) => true,
        }
    }
}

/// A failure classifier backed by a closure.
///
/// # Example
///
/// ```rust
/// use edge_resilience_circuitbreaker::{FailureClassifier, FnClassifier};
/// use edge_resilience_core::BoxError;
/// use http::{Response, StatusCode};
///
/// // Only 503s from the handler should trip the breaker.
/// let classifier = FnClassifier::new(|result: &Result<Response<()>, BoxError>| match result {
///     Ok(response) => response.status() == StatusCode::SERVICE_UNAVAILABLE,
///     Err(_) => true,
/// });
///
/// let mut internal = Response::new(());
/// *internal.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
/// assert!(!classifier.classify(&Ok(internal)));
/// ```
#[derive(Clone)]
pub struct FnClassifier<F> {
    f: Arc<F>,
}

impl<F> FnClassifier<F> {
    /// Creates a new `FnClassifier` from the given closure.
    pub fn new(f: F) -> Self {
        Self { f: Arc::new(f) }
    }
}

impl<F, Res, Err> FailureClassifier<Res, Err> for FnClassifier<F>
where
    F: Fn(&Result<Res, Err>) -> bool + Send + Sync,
{
    fn classify(&self, result: &Result<Res, Err>) -> bool {
        (self.f)(result)
    }
}

impl<F> std::fmt::Debug for FnClassifier<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnClassifier")
            .field("f", &"<closure>")
            .finish()
    }
}
