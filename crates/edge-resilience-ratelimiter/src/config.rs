use crate::events::RateLimiterEvent;
use crate::limiter::LoadSource;
use edge_resilience_core::events::{EventListeners, FnListener};
use edge_resilience_core::identity_from_parts;
use http::{Extensions, HeaderMap};
use std::sync::Arc;
use std::time::Duration;

/// Derives the bucket key for a request from its headers and extensions.
pub type KeyExtractor = Arc<dyn Fn(&HeaderMap, &Extensions) -> String + Send + Sync>;

/// Configuration for the admission controller.
pub struct RateLimiterConfig {
    pub(crate) requests_per_second: f64,
    pub(crate) burst: u32,
    pub(crate) idle_ttl: Duration,
    pub(crate) sweep_interval: Duration,
    pub(crate) adaptive: Option<(Arc<dyn LoadSource>, Duration)>,
    pub(crate) key_extractor: KeyExtractor,
    pub(crate) enabled: bool,
    pub(crate) event_listeners: EventListeners<RateLimiterEvent>,
    pub(crate) name: String,
}

impl RateLimiterConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> RateLimiterConfigBuilder {
        crate::RateLimiterLayer::builder()
    }
}

/// Builder for [`RateLimiterConfig`].
pub struct RateLimiterConfigBuilder {
    requests_per_second: f64,
    burst: u32,
    idle_ttl: Duration,
    sweep_interval: Duration,
    adaptive: Option<(Arc<dyn LoadSource>, Duration)>,
    key_extractor: KeyExtractor,
    enabled: bool,
    event_listeners: EventListeners<RateLimiterEvent>,
    name: String,
}

impl Default for RateLimiterConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiterConfigBuilder {
    /// Creates a new builder with defaults.
    ///
    /// Defaults:
    /// - requests_per_second: 100
    /// - burst: 200
    /// - idle_ttl: 5 minutes
    /// - sweep_interval: 60 seconds
    /// - adaptive: off
    /// - key: client identity (`X-Forwarded-For`, `X-Real-IP`, peer address)
    /// - name: `"<unnamed>"`
    pub fn new() -> Self {
        Self {
            requests_per_second: 100.0,
            burst: 200,
            idle_ttl: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(60),
            adaptive: None,
            key_extractor: Arc::new(identity_from_parts),
            enabled: true,
            event_listeners: EventListeners::new(),
            name: "<unnamed>".to_string(),
        }
    }

    /// Sets the steady-state refill rate, in tokens per second.
    pub fn requests_per_second(mut self, rate: f64) -> Self {
        self.requests_per_second = rate;
        self
    }

    /// Sets the bucket capacity, i.e. how many back-to-back requests a fresh
    /// client may make.
    pub fn burst(mut self, burst: u32) -> Self {
        self.burst = burst;
        self
    }

    /// Sets how long a client may stay silent before its bucket is reclaimed.
    pub fn idle_ttl(mut self, ttl: Duration) -> Self {
        self.idle_ttl = ttl;
        self
    }

    /// Sets how often idle buckets are swept.
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Enables adaptive admission.
    ///
    /// The effective rate is recomputed from `source` at most once per
    /// `interval` (floored at 10 seconds): above 0.8 load it drops to 50% of
    /// the base rate, above 0.6 to 75%, otherwise it stays at 100%.
    ///
    /// # Example
    /// ```rust
    /// use edge_resilience_ratelimiter::RateLimiterLayer;
    /// use std::sync::Arc;
    /// use std::time::Duration;
    ///
    /// let layer = RateLimiterLayer::builder()
    ///     .requests_per_second(50.0)
    ///     .adaptive(Arc::new(|| 0.3), Duration::from_secs(10))
    ///     .build();
    /// ```
    pub fn adaptive(mut self, source: Arc<dyn LoadSource>, interval: Duration) -> Self {
        self.adaptive = Some((source, interval));
        self
    }

    /// Replaces the client identity used to pick a bucket.
    pub fn key_extractor<F>(mut self, f: F) -> Self
    where
        F: Fn(&HeaderMap, &Extensions) -> String + Send + Sync + 'static,
    {
        self.key_extractor = Arc::new(f);
        self
    }

    /// Turns admission control on or off. A disabled limiter passes every
    /// request through untouched.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the name for this limiter instance (used in events and metrics).
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a callback invoked with the client identity of each admitted
    /// request.
    pub fn on_admitted<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RateLimiterEvent::Admitted { client, .. } = event {
                f(client);
            }
        }));
        self
    }

    /// Registers a callback invoked when a client is rejected.
    ///
    /// # Callback Signature
    /// `Fn(&str, Duration)` - the client identity and the time until its bucket
    /// holds a whole token again.
    ///
    /// # Example
    /// ```rust
    /// use edge_resilience_ratelimiter::RateLimiterLayer;
    /// use std::sync::atomic::{AtomicUsize, Ordering};
    /// use std::sync::Arc;
    ///
    /// let rejections = Arc::new(AtomicUsize::new(0));
    /// let counter = Arc::clone(&rejections);
    ///
    /// let layer = RateLimiterLayer::builder()
    ///     .requests_per_second(10.0)
    ///     .burst(10)
    ///     .on_rejected(move |client, retry_after| {
    ///         counter.fetch_add(1, Ordering::SeqCst);
    ///         println!("{client} throttled, retry in {retry_after:?}");
    ///     })
    ///     .build();
    /// ```
    pub fn on_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RateLimiterEvent::Rejected {
                client,
                retry_after,
                ..
            } = event
            {
                f(client, *retry_after);
            }
        }));
        self
    }

    /// Registers a callback invoked with `(load, new_rate)` whenever adaptive
    /// admission changes the effective rate.
    pub fn on_rate_adjusted<F>(mut self, f: F) -> Self
    where
        F: Fn(f64, f64) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RateLimiterEvent::RateAdjusted {
                load, current_rate, ..
            } = event
            {
                f(*load, *current_rate);
            }
        }));
        self
    }

    /// Builds the rate limiter layer.
    ///
    /// # Panics
    ///
    /// Panics if `requests_per_second` is not a positive finite number.
    pub fn build(self) -> crate::RateLimiterLayer {
        assert!(
            self.requests_per_second.is_finite() && self.requests_per_second > 0.0,
            "requests_per_second must be a positive finite number"
        );

        let config = RateLimiterConfig {
            requests_per_second: self.requests_per_second,
            burst: self.burst,
            idle_ttl: self.idle_ttl,
            sweep_interval: self.sweep_interval,
            adaptive: self.adaptive,
            key_extractor: self.key_extractor,
            enabled: self.enabled,
            event_listeners: self.event_listeners,
            name: self.name,
        };

        crate::RateLimiterLayer::new(config)
    }
}
