//! Stress tests for the edge pipeline
//!
//! ## What We Test
//!
//! - **High volume**: hundreds of thousands of admissions and requests
//! - **High concurrency**: thousands of simultaneous callers
//! - **State consistency**: exact admission counts and call counts under contention
//! - **Resource cleanup**: in-flight tables and client maps drain afterwards

pub mod coalesce;
pub mod pipeline;
pub mod ratelimiter;

use std::sync::atomic::{AtomicUsize, Ordering};

/// Utility: Track peak concurrent operations
pub struct ConcurrencyTracker {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyTracker {
    pub fn new() -> Self {
        Self {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    pub fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}
