//! In-process edge resilience for Tower HTTP services.
//!
//! `edge-resilience` wraps a handler in five stages, outermost to innermost:
//!
//! 1. **Admission control** ([`ratelimiter`]): a token bucket per client
//!    identity; over-quota requests get `429` before any other work happens.
//! 2. **Failure isolation** ([`circuitbreaker`]): consecutive failures open
//!    the circuit and calls are refused with `503` until a cooldown and a
//!    few successful probes have passed.
//! 3. **Duplicate suppression** ([`coalesce`]): concurrent identical GET and
//!    HEAD requests share one handler execution.
//! 4. **Response compression** ([`compression`]): gzip for clients that
//!    accept it, above a size threshold.
//! 5. **Metrics** ([`metrics`]): latency histogram, request and error counts.
//!
//! Each stage is an ordinary `tower::Layer` and can be used on its own.
//! [`EdgeLayer`] composes all of them from an [`EdgeConfig`] and renders
//! errors as JSON responses, so the resulting service never fails.
//!
//! # Example
//!
//! ```
//! use edge_resilience::{EdgeConfig, EdgeLayer};
//! use http::{Request, Response, StatusCode};
//! use tower::{Layer, ServiceExt};
//!
//! # async fn example() {
//! let mut config = EdgeConfig::default();
//! config.rate_limit.requests_per_second = 1.0;
//! config.rate_limit.burst = 1;
//!
//! let edge = EdgeLayer::from_config(config);
//! let handler = tower::service_fn(|_req: Request<()>| async {
//!     Ok::<_, std::io::Error>(Response::new(String::from("hello")))
//! });
//! let service = edge.layer(handler);
//!
//! let first = service.clone().oneshot(Request::new(())).await.unwrap();
//! assert_eq!(first.status(), StatusCode::OK);
//!
//! let second = service.oneshot(Request::new(())).await.unwrap();
//! assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `tracing` (default): structured logs from every stage
//! - `metrics`: counters, gauges and histograms through the `metrics` facade

pub mod config;
mod error_response;
mod exporter;
mod pipeline;

pub use config::{
    CircuitBreakerSettings, CoalescingSettings, CompressionSettings, EdgeConfig,
    MetricsSettings, RateLimitSettings,
};
pub use error_response::{ErrorResponse, ErrorResponseLayer};
pub use exporter::MetricsExporter;
pub use pipeline::{ConfigError, EdgeLayer, EdgeLayerBuilder, EdgeService};

pub use edge_resilience_core as core;
pub use edge_resilience_core::{BoxBody, BoxError, EdgeError};

pub use edge_resilience_circuitbreaker as circuitbreaker;
pub use edge_resilience_coalesce as coalesce;
pub use edge_resilience_compression as compression;
pub use edge_resilience_metrics as metrics;
pub use edge_resilience_ratelimiter as ratelimiter;
