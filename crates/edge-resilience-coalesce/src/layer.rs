//! Layer implementation for request coalescing.

use crate::config::CoalesceConfigBuilder;
use crate::service::InFlight;
use crate::{CoalesceConfig, CoalesceService, RequestSignature};
use http::{HeaderMap, Method, Uri};
use std::hash::Hash;
use std::sync::Arc;
use tower_layer::Layer;

#[cfg(feature = "metrics")]
use metrics::{describe_counter, describe_gauge};
#[cfg(feature = "metrics")]
use std::sync::Once;

#[cfg(feature = "metrics")]
static METRICS_INIT: Once = Once::new();

fn describe_metrics() {
    #[cfg(feature = "metrics")]
    METRICS_INIT.call_once(|| {
        describe_counter!(
            "coalesce_requests_total",
            "Total number of requests processed by the coalesce layer"
        );
        describe_gauge!(
            "coalesce_in_flight",
            "Distinct requests executing as leaders"
        );
    });
}

/// A Tower layer that coalesces concurrent identical requests.
///
/// All services produced by one layer share the same in-flight table, so
/// clones of the wrapped service coalesce with each other.
///
/// # Example
///
/// ```rust
/// use edge_resilience_coalesce::CoalesceLayer;
/// use http::{Request, Response};
/// use tower::ServiceBuilder;
///
/// let service = ServiceBuilder::new()
///     .layer(CoalesceLayer::new())
///     .service(tower::service_fn(|_req: Request<()>| async {
///         Ok::<_, std::io::Error>(Response::new(String::from("report")))
///     }));
/// ```
pub struct CoalesceLayer<K = RequestSignature> {
    config: Arc<CoalesceConfig<K>>,
    in_flight: Arc<InFlight<K>>,
}

impl CoalesceLayer {
    /// Create a coalesce layer keyed by [`RequestSignature`].
    pub fn new() -> Self {
        Self::with_config(CoalesceConfig::builder().build())
    }

    /// Create a builder for more configuration options.
    ///
    /// # Example
    ///
    /// ```rust
    /// use edge_resilience_coalesce::CoalesceLayer;
    ///
    /// let layer = CoalesceLayer::builder()
    ///     .name("edge")
    ///     .build();
    /// ```
    pub fn builder() -> CoalesceLayerBuilder {
        CoalesceLayerBuilder {
            config: CoalesceConfigBuilder::new(),
        }
    }
}

impl Default for CoalesceLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> CoalesceLayer<K>
where
    K: Hash + Eq,
{
    /// Create a new coalesce layer with a configuration.
    pub fn with_config(config: CoalesceConfig<K>) -> Self {
        describe_metrics();
        Self {
            config: Arc::new(config),
            in_flight: Arc::new(InFlight::new()),
        }
    }

    /// Number of distinct requests currently executing as leaders.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

impl<K> Clone for CoalesceLayer<K> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            in_flight: Arc::clone(&self.in_flight),
        }
    }
}

impl<S, K> Layer<S> for CoalesceLayer<K> {
    type Service = CoalesceService<S, K>;

    fn layer(&self, service: S) -> Self::Service {
        CoalesceService::new(service, Arc::clone(&self.config), Arc::clone(&self.in_flight))
    }
}

/// Builder for [`CoalesceLayer`].
pub struct CoalesceLayerBuilder<K = RequestSignature> {
    config: CoalesceConfigBuilder<K>,
}

impl<K> CoalesceLayerBuilder<K>
where
    K: Hash + Eq,
{
    /// Replaces the coalescing key; see [`CoalesceConfigBuilder::key_extractor`].
    pub fn key_extractor<K2, F>(self, f: F) -> CoalesceLayerBuilder<K2>
    where
        F: Fn(&Method, &Uri, &HeaderMap) -> Option<K2> + Send + Sync + 'static,
    {
        CoalesceLayerBuilder {
            config: self.config.key_extractor(f),
        }
    }

    /// Turns duplicate suppression on or off.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.config = self.config.enabled(enabled);
        self
    }

    /// Set a name for this coalesce instance.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config = self.config.name(name);
        self
    }

    /// Build the layer.
    pub fn build(self) -> CoalesceLayer<K> {
        CoalesceLayer::with_config(self.config.build())
    }
}
