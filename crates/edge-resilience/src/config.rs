//! Declarative configuration for the whole pipeline.
//!
//! [`EdgeConfig`] deserializes from any serde format; every field has a
//! default, so an empty document yields the stock pipeline.
//!
//! ```
//! use edge_resilience::EdgeConfig;
//!
//! let config = EdgeConfig::from_json(r#"{
//!     "rate_limit": { "requests_per_second": 20.0, "burst": 40 },
//!     "compression": { "min_size": 512 }
//! }"#).unwrap();
//!
//! assert_eq!(config.rate_limit.burst, 40);
//! assert_eq!(config.rate_limit.idle_ttl_secs, 300);
//! assert_eq!(config.compression.level, 6);
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for every stage of the edge pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeConfig {
    pub rate_limit: RateLimitSettings,
    pub circuit_breaker: CircuitBreakerSettings,
    pub coalescing: CoalescingSettings,
    pub compression: CompressionSettings,
    pub metrics: MetricsSettings,
}

impl EdgeConfig {
    /// Parses a JSON document.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Admission control settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub enabled: bool,
    pub requests_per_second: f64,
    pub burst: u32,
    pub idle_ttl_secs: u64,
    pub sweep_interval_secs: u64,
    /// Scale the rate down under load; needs a load source on the builder.
    pub adaptive: bool,
    pub adaptive_interval_secs: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_second: 100.0,
            burst: 200,
            idle_ttl_secs: 300,
            sweep_interval_secs: 60,
            adaptive: false,
            adaptive_interval_secs: 10,
        }
    }
}

impl RateLimitSettings {
    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn adaptive_interval(&self) -> Duration {
        Duration::from_secs(self.adaptive_interval_secs)
    }
}

/// Circuit breaker settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub enabled: bool,
    pub failure_threshold: u32,
    pub cooldown_secs: u64,
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            cooldown_secs: 30,
            half_open_max_calls: 3,
        }
    }
}

impl CircuitBreakerSettings {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// Request coalescing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoalescingSettings {
    pub enabled: bool,
}

impl Default for CoalescingSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Response compression settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionSettings {
    pub enabled: bool,
    pub min_size: usize,
    pub level: u32,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            min_size: 1024,
            level: 6,
        }
    }
}

/// Latency recording settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    pub enabled: bool,
    /// Histogram bucket upper bounds in milliseconds.
    pub buckets_ms: Vec<u64>,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            buckets_ms: edge_resilience_metrics::DEFAULT_BOUNDS_MS.to_vec(),
        }
    }
}
