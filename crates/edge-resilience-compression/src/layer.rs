use crate::config::{CompressionConfig, CompressionConfigBuilder};
use crate::pool::EncoderPool;
use crate::stats::CompressionStats;
use crate::Compression;
use std::sync::Arc;
use tower::Layer;

#[cfg(feature = "metrics")]
use metrics::describe_counter;
#[cfg(feature = "metrics")]
use std::sync::Once;

#[cfg(feature = "metrics")]
static METRICS_INIT: Once = Once::new();

/// A Tower Layer that gzip-compresses eligible responses.
///
/// Services produced by one layer share its encoder pool and statistics.
#[derive(Clone)]
pub struct CompressionLayer {
    config: Arc<CompressionConfig>,
    pool: EncoderPool,
    stats: Arc<CompressionStats>,
}

impl CompressionLayer {
    /// Creates a new builder.
    pub fn builder() -> CompressionConfigBuilder {
        #[cfg(feature = "metrics")]
        {
            METRICS_INIT.call_once(|| {
                describe_counter!(
                    "compression_responses_total",
                    "Responses seen by the compressor, by outcome"
                );
                describe_counter!(
                    "compression_bytes_saved_total",
                    "Bytes not sent thanks to gzip"
                );
            });
        }
        CompressionConfigBuilder::new()
    }

    /// Creates a new `CompressionLayer` from the given configuration.
    pub fn new(config: CompressionConfig) -> Self {
        let pool = EncoderPool::new(config.level, config.pool_size);
        Self {
            config: Arc::new(config),
            pool,
            stats: Arc::new(CompressionStats::new()),
        }
    }

    /// Compression totals for all services built from this layer.
    pub fn stats(&self) -> &Arc<CompressionStats> {
        &self.stats
    }

    /// The shared encoder pool.
    pub fn pool(&self) -> &EncoderPool {
        &self.pool
    }
}

impl<S> Layer<S> for CompressionLayer {
    type Service = Compression<S>;

    fn layer(&self, service: S) -> Self::Service {
        Compression::new(
            service,
            Arc::clone(&self.config),
            self.pool.clone(),
            Arc::clone(&self.stats),
        )
    }
}
