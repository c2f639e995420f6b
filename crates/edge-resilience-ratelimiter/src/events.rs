use edge_resilience_core::events::EdgeEvent;
use std::time::Duration;
use tokio::time::Instant;

/// Events emitted by the admission controller.
#[derive(Debug, Clone)]
pub enum RateLimiterEvent {
    /// A request consumed a token and was passed downstream.
    Admitted {
        pattern_name: String,
        timestamp: Instant,
        client: String,
    },
    /// A request found its client's bucket empty.
    Rejected {
        pattern_name: String,
        timestamp: Instant,
        client: String,
        retry_after: Duration,
    },
    /// The adaptive controller changed the effective refill rate.
    RateAdjusted {
        pattern_name: String,
        timestamp: Instant,
        load: f64,
        previous_rate: f64,
        current_rate: f64,
    },
}

impl EdgeEvent for RateLimiterEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RateLimiterEvent::Admitted { .. } => "admitted",
            RateLimiterEvent::Rejected { .. } => "rejected",
            RateLimiterEvent::RateAdjusted { .. } => "rate_adjusted",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RateLimiterEvent::Admitted { timestamp, .. }
            | RateLimiterEvent::Rejected { timestamp, .. }
            | RateLimiterEvent::RateAdjusted { timestamp, .. } => *timestamp,
        }
    }

    fn component_name(&self) -> &str {
        match self {
            RateLimiterEvent::Admitted { pattern_name, .. }
            | RateLimiterEvent::Rejected { pattern_name, .. }
            | RateLimiterEvent::RateAdjusted { pattern_name, .. } => pattern_name,
        }
    }
}
