//! Service implementation for request coalescing.

use crate::CoalesceConfig;
use bytes::Bytes;
use edge_resilience_core::body::{self, BoxBody};
use edge_resilience_core::{BoxError, Coalesced, LeaderCancelled};
use futures::future::{BoxFuture, FutureExt};
use hashbrown::HashMap;
use http::{HeaderMap, Request, Response, StatusCode, Version};
use http_body_util::BodyExt;
use parking_lot::Mutex;
use std::hash::Hash;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::broadcast;
use tower_service::Service;

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

#[cfg(feature = "tracing")]
use tracing::debug;

/// A fully buffered response that can be replayed to any number of callers.
#[derive(Debug, Clone)]
pub struct CapturedResponse {
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
}

impl CapturedResponse {
    async fn capture<B>(response: Response<B>) -> Result<Self, BoxError>
    where
        B: http_body::Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = response.into_parts();
        let body = body.collect().await.map_err(Into::<BoxError>::into)?.to_bytes();
        Ok(Self {
            status: parts.status,
            version: parts.version,
            headers: parts.headers,
            body,
        })
    }

    /// Builds a fresh response carrying the captured status, headers and body.
    pub fn to_response(&self) -> Response<BoxBody> {
        let mut response = Response::new(body::full(self.body.clone()));
        *response.status_mut() = self.status;
        *response.version_mut() = self.version;
        *response.headers_mut() = self.headers.clone();
        response
    }

    /// The captured status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The captured body bytes.
    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

type Outcome = Result<CapturedResponse, Coalesced>;

struct Pending {
    sender: broadcast::Sender<Outcome>,
    waiters: usize,
}

enum Role {
    Leader,
    Waiter(broadcast::Receiver<Outcome>),
}

/// Requests currently executing, by key.
pub(crate) struct InFlight<K> {
    requests: Mutex<HashMap<K, Pending>>,
}

impl<K> InFlight<K>
where
    K: Hash + Eq,
{
    pub(crate) fn new() -> Self {
        Self {
            requests: Mutex::new(HashMap::new()),
        }
    }

    /// Registers `key` with us as leader, or subscribes to the existing
    /// leader's result. Both happen under one lock acquisition.
    fn join(&self, key: K) -> Role {
        let mut requests = self.requests.lock();
        if let Some(pending) = requests.get_mut(&key) {
            pending.waiters += 1;
            Role::Waiter(pending.sender.subscribe())
        } else {
            let (sender, _) = broadcast::channel(1);
            requests.insert(key, Pending { sender, waiters: 0 });
            Role::Leader
        }
    }

    /// Removes `key` and returns its sender and waiter count.
    fn finish(&self, key: &K) -> Option<Pending> {
        self.requests.lock().remove(key)
    }

    pub(crate) fn len(&self) -> usize {
        self.requests.lock().len()
    }
}

/// Unregisters the leader if its future is dropped before completing, so
/// waiters see a closed channel instead of waiting forever.
struct LeaderGuard<K: Hash + Eq> {
    in_flight: Arc<InFlight<K>>,
    key: Option<K>,
}

impl<K: Hash + Eq> LeaderGuard<K> {
    fn complete(mut self) -> Option<Pending> {
        let key = self.key.take()?;
        self.in_flight.finish(&key)
    }
}

impl<K: Hash + Eq> Drop for LeaderGuard<K> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.in_flight.finish(&key);
        }
    }
}

/// A service that coalesces concurrent identical requests.
///
/// When multiple requests arrive concurrently with the same key, only the
/// first one executes. The others wait for its buffered response and each
/// receive their own copy.
pub struct CoalesceService<S, K> {
    inner: S,
    config: Arc<CoalesceConfig<K>>,
    in_flight: Arc<InFlight<K>>,
}

impl<S, K> CoalesceService<S, K> {
    pub(crate) fn new(inner: S, config: Arc<CoalesceConfig<K>>, in_flight: Arc<InFlight<K>>) -> Self {
        Self {
            inner,
            config,
            in_flight,
        }
    }
}

impl<S, K> CoalesceService<S, K>
where
    K: Hash + Eq,
{
    /// Number of distinct requests currently executing as leaders.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

impl<S, K> Clone for CoalesceService<S, K>
where
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            config: Arc::clone(&self.config),
            in_flight: Arc::clone(&self.in_flight),
        }
    }
}

impl<S, K, ReqBody, ResBody> Service<Request<ReqBody>> for CoalesceService<S, K>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Error: Into<BoxError>,
    S::Future: Send + 'static,
    ResBody: http_body::Body<Data = Bytes> + Send + 'static,
    ResBody::Error: Into<BoxError>,
    K: Hash + Eq + Clone + Send + Sync + 'static,
{
    type Response = Response<BoxBody>;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Response<BoxBody>, BoxError>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let key = if self.config.enabled {
            (self.config.key_extractor)(request.method(), request.uri(), request.headers())
        } else {
            None
        };

        #[cfg(any(feature = "metrics", feature = "tracing"))]
        let name = self.config.name.clone().unwrap_or_else(|| "<unnamed>".to_string());

        let Some(key) = key else {
            #[cfg(feature = "metrics")]
            counter!("coalesce_requests_total", "coalesce" => name, "role" => "bypass").increment(1);

            return self
                .inner
                .call(request)
                .map(|result| {
                    result
                        .map(|response| response.map(body::boxed))
                        .map_err(Into::into)
                })
                .boxed();
        };

        match self.in_flight.join(key.clone()) {
            Role::Waiter(mut receiver) => {
                #[cfg(feature = "metrics")]
                counter!("coalesce_requests_total", "coalesce" => name.clone(), "role" => "waiter").increment(1);

                #[cfg(feature = "tracing")]
                debug!(coalesce = %name, "Request coalesced as waiter");

                Box::pin(async move {
                    match receiver.recv().await {
                        Ok(Ok(captured)) => Ok(captured.to_response()),
                        Ok(Err(coalesced)) => Err(Box::new(coalesced) as BoxError),
                        Err(_) => {
                            #[cfg(feature = "tracing")]
                            debug!(coalesce = %name, "Leader dropped before completing");

                            Err(Box::new(LeaderCancelled) as BoxError)
                        }
                    }
                })
            }
            Role::Leader => {
                #[cfg(feature = "metrics")]
                {
                    counter!("coalesce_requests_total", "coalesce" => name.clone(), "role" => "leader").increment(1);
                    gauge!("coalesce_in_flight", "coalesce" => name.clone())
                        .set(self.in_flight.len() as f64);
                }

                #[cfg(feature = "tracing")]
                debug!(coalesce = %name, "Request executing as leader");

                let guard = LeaderGuard {
                    in_flight: Arc::clone(&self.in_flight),
                    key: Some(key),
                };
                let future = self.inner.call(request);

                Box::pin(async move {
                    // Convert the error before the next await; S::Error need not be Send.
                    let outcome: Result<_, BoxError> = future.await.map_err(Into::into);
                    let result = match outcome {
                        Ok(response) => CapturedResponse::capture(response).await,
                        Err(err) => Err(err),
                    };

                    // Unregister before broadcasting so late arrivals start a new execution.
                    let Some(pending) = guard.complete() else {
                        return result.map(|captured| captured.to_response());
                    };

                    #[cfg(feature = "tracing")]
                    debug!(coalesce = %name, waiters = pending.waiters, "Leader completed");

                    if pending.waiters == 0 {
                        return result.map(|captured| captured.to_response());
                    }

                    match result {
                        Ok(captured) => {
                            let response = captured.to_response();
                            let _ = pending.sender.send(Ok(captured));
                            Ok(response)
                        }
                        Err(err) => {
                            let shared = Coalesced::new(err);
                            let _ = pending.sender.send(Err(shared.clone()));
                            Err(Box::new(shared) as BoxError)
                        }
                    }
                })
            }
        }
    }
}
