#[cfg(feature = "metrics")]
use metrics::counter;
use std::sync::atomic::{AtomicU64, Ordering};

/// Running totals for compressed responses.
///
/// Only streams that finished cleanly are counted.
#[derive(Debug, Default)]
pub struct CompressionStats {
    responses: AtomicU64,
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
}

impl CompressionStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&self, bytes_in: u64, bytes_out: u64) {
        self.responses.fetch_add(1, Ordering::Relaxed);
        self.bytes_in.fetch_add(bytes_in, Ordering::Relaxed);
        self.bytes_out.fetch_add(bytes_out, Ordering::Relaxed);

        #[cfg(feature = "metrics")]
        counter!("compression_bytes_saved_total").increment(bytes_in.saturating_sub(bytes_out));
    }

    /// Responses delivered gzip-encoded.
    pub fn responses_compressed(&self) -> u64 {
        self.responses.load(Ordering::Relaxed)
    }

    /// Uncompressed bytes fed to the encoder.
    pub fn bytes_in(&self) -> u64 {
        self.bytes_in.load(Ordering::Relaxed)
    }

    /// Bytes written on the wire, gzip framing included.
    pub fn bytes_out(&self) -> u64 {
        self.bytes_out.load(Ordering::Relaxed)
    }

    /// Bytes not sent thanks to compression.
    pub fn bytes_saved(&self) -> u64 {
        self.bytes_in().saturating_sub(self.bytes_out())
    }
}
