use crate::histogram::{validate_bounds, DEFAULT_BOUNDS_MS};

/// Configuration for the metrics recorder.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    pub(crate) enabled: bool,
    pub(crate) bounds_ms: Vec<u64>,
    pub(crate) name: String,
}

impl MetricsConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> MetricsConfigBuilder {
        MetricsConfigBuilder::new()
    }

    /// Histogram bucket bounds in milliseconds.
    pub fn bounds_ms(&self) -> &[u64] {
        &self.bounds_ms
    }
}

/// Builder for [`MetricsConfig`].
pub struct MetricsConfigBuilder {
    enabled: bool,
    bounds_ms: Vec<u64>,
    name: String,
}

impl Default for MetricsConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsConfigBuilder {
    /// Creates a new builder with defaults.
    ///
    /// Defaults:
    /// - buckets: 1, 5, 10, 25, 50, 100, 250, 500, 1000 ms
    /// - name: `"<unnamed>"`
    pub fn new() -> Self {
        Self {
            enabled: true,
            bounds_ms: DEFAULT_BOUNDS_MS.to_vec(),
            name: "<unnamed>".to_string(),
        }
    }

    /// Turns recording on or off. When off, requests pass straight through.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the histogram bucket upper bounds in milliseconds.
    pub fn buckets<I>(mut self, bounds_ms: I) -> Self
    where
        I: IntoIterator<Item = u64>,
    {
        self.bounds_ms = bounds_ms.into_iter().collect();
        self
    }

    /// Sets the name for this recorder (used in logs and metrics).
    pub fn name<N: Into<String>>(mut self, n: N) -> Self {
        self.name = n.into();
        self
    }

    /// Builds the configuration.
    ///
    /// # Panics
    ///
    /// Panics if the bucket bounds are empty or not strictly increasing.
    pub fn into_config(self) -> MetricsConfig {
        if let Err(e) = validate_bounds(&self.bounds_ms) {
            panic!("invalid metrics buckets: {e}");
        }
        MetricsConfig {
            enabled: self.enabled,
            bounds_ms: self.bounds_ms,
            name: self.name,
        }
    }

    /// Builds the metrics layer.
    ///
    /// # Panics
    ///
    /// Panics if the bucket bounds are empty or not strictly increasing.
    pub fn build(self) -> crate::MetricsLayer {
        crate::MetricsLayer::new(self.into_config())
    }
}
