//! Configuration for the coalesce layer.

use crate::RequestSignature;
use http::{HeaderMap, Method, Uri};
use std::sync::Arc;

/// Computes a coalescing key from the request head; `None` means the request
/// always executes on its own.
pub type SignatureFn<K> = Arc<dyn Fn(&Method, &Uri, &HeaderMap) -> Option<K> + Send + Sync>;

/// Configuration for the coalesce layer.
pub struct CoalesceConfig<K = RequestSignature> {
    /// Function to extract a key from a request.
    pub(crate) key_extractor: SignatureFn<K>,
    pub(crate) enabled: bool,
    /// Optional name for metrics/tracing.
    #[cfg_attr(not(any(feature = "metrics", feature = "tracing")), allow(dead_code))]
    pub(crate) name: Option<String>,
}

impl CoalesceConfig {
    /// Create a builder keyed by [`RequestSignature`].
    pub fn builder() -> CoalesceConfigBuilder {
        CoalesceConfigBuilder::new()
    }
}

impl<K> std::fmt::Debug for CoalesceConfig<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoalesceConfig")
            .field("enabled", &self.enabled)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Builder for coalesce configuration.
pub struct CoalesceConfigBuilder<K = RequestSignature> {
    key_extractor: SignatureFn<K>,
    enabled: bool,
    name: Option<String>,
}

impl Default for CoalesceConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CoalesceConfigBuilder {
    /// Create a new builder using [`RequestSignature::of`] as the key.
    pub fn new() -> Self {
        Self {
            key_extractor: Arc::new(RequestSignature::of),
            enabled: true,
            name: None,
        }
    }
}

impl<K> CoalesceConfigBuilder<K> {
    /// Replaces the coalescing key.
    ///
    /// # Example
    ///
    /// ```rust
    /// use edge_resilience_coalesce::CoalesceConfig;
    /// use http::Method;
    ///
    /// // Coalesce report downloads by path alone.
    /// let config = CoalesceConfig::builder()
    ///     .key_extractor(|method, uri, _headers| {
    ///         (method == Method::GET && uri.path().starts_with("/reports/"))
    ///             .then(|| uri.path().to_string())
    ///     })
    ///     .build();
    /// ```
    pub fn key_extractor<K2, F>(self, f: F) -> CoalesceConfigBuilder<K2>
    where
        F: Fn(&Method, &Uri, &HeaderMap) -> Option<K2> + Send + Sync + 'static,
    {
        CoalesceConfigBuilder {
            key_extractor: Arc::new(f),
            enabled: self.enabled,
            name: self.name,
        }
    }

    /// Turns duplicate suppression on or off.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set a name for this coalesce instance (for metrics/tracing).
    ///
    /// # Example
    ///
    /// ```rust
    /// use edge_resilience_coalesce::CoalesceConfig;
    ///
    /// let config = CoalesceConfig::builder()
    ///     .name("edge")
    ///     .build();
    /// ```
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Build the configuration.
    pub fn build(self) -> CoalesceConfig<K> {
        CoalesceConfig {
            key_extractor: self.key_extractor,
            enabled: self.enabled,
            name: self.name,
        }
    }
}
