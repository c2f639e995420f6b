/// Configuration for the response compressor.
#[derive(Debug, Clone)]
pub struct CompressionConfig {
    pub(crate) enabled: bool,
    pub(crate) min_size: usize,
    pub(crate) level: u32,
    pub(crate) pool_size: usize,
    pub(crate) name: String,
}

impl CompressionConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> CompressionConfigBuilder {
        CompressionConfigBuilder::new()
    }

    /// Bytes a body must reach before it is compressed.
    pub fn min_size(&self) -> usize {
        self.min_size
    }

    /// Deflate level, 0 (store) to 9 (smallest).
    pub fn level(&self) -> u32 {
        self.level
    }
}

/// Builder for [`CompressionConfig`].
pub struct CompressionConfigBuilder {
    enabled: bool,
    min_size: usize,
    level: u32,
    pool_size: usize,
    name: String,
}

impl Default for CompressionConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CompressionConfigBuilder {
    /// Creates a new builder with defaults.
    ///
    /// Defaults:
    /// - min_size: 1024 bytes
    /// - level: 6
    /// - pool_size: 32 idle encoders
    /// - name: `"<unnamed>"`
    pub fn new() -> Self {
        Self {
            enabled: true,
            min_size: 1024,
            level: 6,
            pool_size: 32,
            name: "<unnamed>".to_string(),
        }
    }

    /// Turns compression on or off.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the size below which responses are sent uncompressed.
    pub fn min_size(mut self, bytes: usize) -> Self {
        self.min_size = bytes;
        self
    }

    /// Sets the deflate level (0-9).
    pub fn level(mut self, level: u32) -> Self {
        self.level = level;
        self
    }

    /// Sets how many idle encoders are kept for reuse.
    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    /// Sets the name for this compressor (used in logs and metrics).
    pub fn name<N: Into<String>>(mut self, n: N) -> Self {
        self.name = n.into();
        self
    }

    /// Builds the configuration.
    ///
    /// # Panics
    ///
    /// Panics if `level` is greater than 9.
    pub fn into_config(self) -> CompressionConfig {
        assert!(self.level <= 9, "compression level must be between 0 and 9");
        CompressionConfig {
            enabled: self.enabled,
            min_size: self.min_size,
            level: self.level,
            pool_size: self.pool_size,
            name: self.name,
        }
    }

    /// Builds the compression layer.
    ///
    /// # Panics
    ///
    /// Panics if `level` is greater than 9.
    pub fn build(self) -> crate::CompressionLayer {
        crate::CompressionLayer::new(self.into_config())
    }
}
