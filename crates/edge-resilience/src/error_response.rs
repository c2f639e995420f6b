//! Renders pipeline errors as HTTP responses.

use edge_resilience_core::{BoxBody, BoxError, EdgeError};
use futures::future::{self, BoxFuture, FutureExt};
use http::Response;
use std::convert::Infallible;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Outermost adapter turning every error into a JSON response.
///
/// Rejections keep their dedicated status codes (429, 503); any other error
/// becomes a 500. The resulting service never fails, which is what HTTP
/// servers expect of the service they drive.
///
/// A readiness failure from the inner stack is held and answered as the
/// response to the next call, without calling the inner service.
#[derive(Debug)]
pub struct ErrorResponse<S> {
    inner: S,
    ready_error: Option<BoxError>,
}

impl<S: Clone> Clone for ErrorResponse<S> {
    fn clone(&self) -> Self {
        Self::new(self.inner.clone())
    }
}

impl<S> ErrorResponse<S> {
    /// Wraps `inner`.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            ready_error: None,
        }
    }

    /// The wrapped service.
    pub fn get_ref(&self) -> &S {
        &self.inner
    }
}

impl<S, Req> Service<Req> for ErrorResponse<S>
where
    S: Service<Req, Response = Response<BoxBody>>,
    S::Error: Into<BoxError>,
    S::Future: Send + 'static,
{
    type Response = Response<BoxBody>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response<BoxBody>, Infallible>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        if self.ready_error.is_some() {
            return Poll::Ready(Ok(()));
        }
        match self.inner.poll_ready(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(())) => Poll::Ready(Ok(())),
            Poll::Ready(Err(err)) => {
                self.ready_error = Some(err.into());
                Poll::Ready(Ok(()))
            }
        }
    }

    fn call(&mut self, req: Req) -> Self::Future {
        if let Some(err) = self.ready_error.take() {
            return future::ready(Ok(render(err))).boxed();
        }
        self.inner
            .call(req)
            .map(|result| Ok(result.unwrap_or_else(|e| render(e.into()))))
            .boxed()
    }
}

fn render(err: BoxError) -> Response<BoxBody> {
    let classified = EdgeError::classify(err);

    #[cfg(feature = "tracing")]
    if !classified.is_handler() {
        tracing::debug!(status = classified.status().as_u16(), error = %classified, "request rejected");
    }

    classified.into_response()
}

/// Layer producing [`ErrorResponse`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorResponseLayer;

impl ErrorResponseLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for ErrorResponseLayer {
    type Service = ErrorResponse<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ErrorResponse::new(inner)
    }
}
