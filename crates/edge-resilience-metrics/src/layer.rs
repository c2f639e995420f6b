use crate::config::{MetricsConfig, MetricsConfigBuilder};
use crate::recorder::{BytesSavedSource, MetricsRecorder};
use crate::Metrics;
use std::sync::Arc;
use tower::Layer;

#[cfg(feature = "metrics")]
use metrics::{describe_counter, describe_histogram};
#[cfg(feature = "metrics")]
use std::sync::Once;

#[cfg(feature = "metrics")]
static METRICS_INIT: Once = Once::new();

/// A Tower Layer that records latency and outcome of every request.
///
/// All services built from one layer report into the same
/// [`MetricsRecorder`].
#[derive(Clone)]
pub struct MetricsLayer {
    config: Arc<MetricsConfig>,
    recorder: Arc<MetricsRecorder>,
}

impl MetricsLayer {
    /// Creates a new builder.
    pub fn builder() -> MetricsConfigBuilder {
        #[cfg(feature = "metrics")]
        {
            METRICS_INIT.call_once(|| {
                describe_counter!(
                    "edge_requests_total",
                    "Requests that reached the handler, by outcome"
                );
                describe_histogram!(
                    "edge_request_duration_seconds",
                    "Handler latency in seconds"
                );
            });
        }
        MetricsConfigBuilder::new()
    }

    /// Creates a new `MetricsLayer` from the given configuration.
    pub fn new(config: MetricsConfig) -> Self {
        Self::with_recorder(config, |recorder| recorder)
    }

    /// Creates a layer whose snapshots report `bytes_saved` from `source`.
    pub fn with_bytes_saved(config: MetricsConfig, source: BytesSavedSource) -> Self {
        Self::with_recorder(config, |recorder| recorder.with_bytes_saved(source))
    }

    fn with_recorder(
        config: MetricsConfig,
        customize: impl FnOnce(MetricsRecorder) -> MetricsRecorder,
    ) -> Self {
        let recorder = match MetricsRecorder::with_bounds(config.bounds_ms.clone()) {
            Ok(recorder) => recorder,
            // bounds were validated by the builder
            Err(_) => MetricsRecorder::new(),
        };
        Self {
            config: Arc::new(config),
            recorder: Arc::new(customize(recorder)),
        }
    }

    /// The recorder shared by every service from this layer.
    pub fn recorder(&self) -> &Arc<MetricsRecorder> {
        &self.recorder
    }
}

impl<S> Layer<S> for MetricsLayer {
    type Service = Metrics<S>;

    fn layer(&self, service: S) -> Self::Service {
        Metrics::new(service, Arc::clone(&self.config), Arc::clone(&self.recorder))
    }
}
