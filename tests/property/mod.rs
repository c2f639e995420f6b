//! Property tests, one module per component.

mod circuit_breaker;
mod histogram;
mod rate_limiter;
