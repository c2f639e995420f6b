//! Assembly of the five stages into one layer.

use crate::config::EdgeConfig;
use crate::error_response::ErrorResponse;
use crate::exporter::MetricsExporter;
use edge_resilience_circuitbreaker::{Circuit, CircuitBreaker, CircuitBreakerLayer};
use edge_resilience_coalesce::{CoalesceLayer, CoalesceService, RequestSignature};
use edge_resilience_compression::{Compression, CompressionLayer, CompressionStats};
use edge_resilience_metrics::{
    HistogramError, LatencyHistogram, Metrics, MetricsConfig, MetricsLayer, MetricsRecorder,
};
use edge_resilience_ratelimiter::{AdmissionController, LoadSource, RateLimiter, RateLimiterLayer};
use std::sync::Arc;
use thiserror::Error;
use tower::Layer;

/// The full stack around a handler `S`, outermost first:
/// error rendering, admission control, circuit breaker, coalescing,
/// compression, metrics.
pub type EdgeService<S> = ErrorResponse<
    RateLimiter<CircuitBreaker<CoalesceService<Compression<Metrics<S>>, RequestSignature>>>,
>;

/// Invalid values in an [`EdgeConfig`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// The admission rate is zero, negative or not finite.
    #[error("rate_limit.requests_per_second must be a positive finite number, got {0}")]
    InvalidRate(f64),
    /// The deflate level is outside 0-9.
    #[error("compression.level must be between 0 and 9, got {0}")]
    InvalidCompressionLevel(u32),
    /// The histogram bounds cannot be used.
    #[error("metrics.buckets_ms: {0}")]
    InvalidBuckets(#[from] HistogramError),
}

impl EdgeConfig {
    /// Checks every value the stage builders would reject.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let rate = self.rate_limit.requests_per_second;
        if !(rate.is_finite() && rate > 0.0) {
            return Err(ConfigError::InvalidRate(rate));
        }
        if self.compression.level > 9 {
            return Err(ConfigError::InvalidCompressionLevel(self.compression.level));
        }
        LatencyHistogram::new(self.metrics.buckets_ms.clone())?;
        Ok(())
    }
}

/// One layer applying the whole edge pipeline.
///
/// State (client buckets, breaker, in-flight table, encoder pool, recorder)
/// belongs to the layer, so every service it produces shares it. Build one
/// layer per protected handler.
#[derive(Clone)]
pub struct EdgeLayer {
    rate_limiter: RateLimiterLayer,
    circuit_breaker: CircuitBreakerLayer,
    coalesce: CoalesceLayer,
    compression: CompressionLayer,
    metrics: MetricsLayer,
}

impl EdgeLayer {
    /// Creates a new builder.
    pub fn builder() -> EdgeLayerBuilder {
        EdgeLayerBuilder::new()
    }

    /// Builds the pipeline described by `config`.
    ///
    /// # Panics
    ///
    /// Panics if `config` fails [`EdgeConfig::validate`].
    pub fn from_config(config: EdgeConfig) -> Self {
        EdgeLayerBuilder::new().config(config).build()
    }

    /// Client buckets of the admission controller.
    pub fn controller(&self) -> &Arc<AdmissionController> {
        self.rate_limiter.controller()
    }

    /// The circuit breaker's state machine.
    pub fn circuit(&self) -> &Arc<Circuit> {
        self.circuit_breaker.circuit()
    }

    /// Requests currently executing as coalescing leaders.
    pub fn in_flight(&self) -> usize {
        self.coalesce.in_flight()
    }

    /// Compression totals.
    pub fn compression_stats(&self) -> &Arc<CompressionStats> {
        self.compression.stats()
    }

    /// The latency and outcome recorder.
    pub fn recorder(&self) -> &Arc<MetricsRecorder> {
        self.metrics.recorder()
    }

    /// A service serving the recorder's snapshot as JSON.
    pub fn exporter(&self) -> MetricsExporter {
        MetricsExporter::new(Arc::clone(self.recorder()))
    }
}

impl<S> Layer<S> for EdgeLayer {
    type Service = EdgeService<S>;

    fn layer(&self, handler: S) -> Self::Service {
        let service = self.metrics.layer(handler);
        let service = self.compression.layer(service);
        let service = self.coalesce.layer(service);
        let service = self.circuit_breaker.layer(service);
        let service = self.rate_limiter.layer(service);
        ErrorResponse::new(service)
    }
}

/// Builder for [`EdgeLayer`].
pub struct EdgeLayerBuilder {
    config: EdgeConfig,
    load_source: Option<Arc<dyn LoadSource>>,
    name: String,
}

impl Default for EdgeLayerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EdgeLayerBuilder {
    /// Creates a builder using [`EdgeConfig::default`] and the name `"edge"`.
    pub fn new() -> Self {
        Self {
            config: EdgeConfig::default(),
            load_source: None,
            name: "edge".to_string(),
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: EdgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Supplies system load for adaptive admission.
    ///
    /// Only consulted when `rate_limit.adaptive` is set.
    pub fn load_source(mut self, source: Arc<dyn LoadSource>) -> Self {
        self.load_source = Some(source);
        self
    }

    /// Names every stage (used in logs and metrics labels).
    pub fn name<N: Into<String>>(mut self, name: N) -> Self {
        self.name = name.into();
        self
    }

    /// Builds the layer, reporting invalid configuration as an error.
    pub fn try_build(self) -> Result<EdgeLayer, ConfigError> {
        self.config.validate()?;
        let EdgeConfig {
            rate_limit,
            circuit_breaker,
            coalescing,
            compression,
            metrics,
        } = self.config;

        let mut limiter = RateLimiterLayer::builder()
            .requests_per_second(rate_limit.requests_per_second)
            .burst(rate_limit.burst)
            .idle_ttl(rate_limit.idle_ttl())
            .sweep_interval(rate_limit.sweep_interval())
            .enabled(rate_limit.enabled)
            .name(self.name.clone());
        if rate_limit.adaptive {
            match self.load_source {
                Some(source) => {
                    limiter = limiter.adaptive(source, rate_limit.adaptive_interval());
                }
                None => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        pipeline = %self.name,
                        "adaptive admission requested without a load source; using the fixed rate"
                    );
                }
            }
        }

        let circuit_breaker = CircuitBreakerLayer::builder()
            .failure_threshold(circuit_breaker.failure_threshold)
            .cooldown(circuit_breaker.cooldown())
            .half_open_max_calls(circuit_breaker.half_open_max_calls)
            .enabled(circuit_breaker.enabled)
            .name(self.name.clone())
            .build();

        let coalesce = CoalesceLayer::builder()
            .enabled(coalescing.enabled)
            .name(self.name.clone())
            .build();

        let compression = CompressionLayer::builder()
            .enabled(compression.enabled)
            .min_size(compression.min_size)
            .level(compression.level)
            .name(self.name.clone())
            .build();

        let stats = Arc::clone(compression.stats());
        let metrics_config = MetricsConfig::builder()
            .enabled(metrics.enabled)
            .buckets(metrics.buckets_ms)
            .name(self.name.clone())
            .into_config();
        let metrics = MetricsLayer::with_bytes_saved(
            metrics_config,
            Arc::new(move || stats.bytes_saved()),
        );

        #[cfg(feature = "tracing")]
        tracing::debug!(
            pipeline = %self.name,
            rate = rate_limit.requests_per_second,
            burst = rate_limit.burst,
            "edge pipeline built"
        );

        Ok(EdgeLayer {
            rate_limiter: limiter.build(),
            circuit_breaker,
            coalesce,
            compression,
            metrics,
        })
    }

    /// Builds the layer.
    ///
    /// # Panics
    ///
    /// Panics if the configuration fails [`EdgeConfig::validate`].
    pub fn build(self) -> EdgeLayer {
        match self.try_build() {
            Ok(layer) => layer,
            Err(e) => panic!("invalid edge configuration: {e}"),
        }
    }
}
