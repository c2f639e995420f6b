use flate2::{Compress, Compression};
use parking_lot::Mutex;
use std::sync::Arc;

struct PoolInner {
    level: Compression,
    capacity: usize,
    idle: Mutex<Vec<Compress>>,
}

/// A bounded pool of raw-deflate encoders at one compression level.
///
/// Encoders are handed out as [`PooledEncoder`] guards. A guard returns its
/// encoder, reset, only if the stream it served was finished cleanly; an
/// encoder from an abandoned or failed stream is dropped.
#[derive(Clone)]
pub struct EncoderPool {
    inner: Arc<PoolInner>,
}

impl EncoderPool {
    /// Creates an empty pool keeping at most `capacity` idle encoders.
    pub fn new(level: u32, capacity: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                level: Compression::new(level.min(9)),
                capacity,
                idle: Mutex::new(Vec::with_capacity(capacity)),
            }),
        }
    }

    /// Takes an idle encoder, or creates one if none is available.
    pub fn acquire(&self) -> PooledEncoder {
        let compress = self
            .inner
            .idle
            .lock()
            .pop()
            .unwrap_or_else(|| Compress::new(self.inner.level, false));
        PooledEncoder {
            pool: Arc::clone(&self.inner),
            compress: Some(compress),
            finished: false,
        }
    }

    /// Number of encoders waiting for reuse.
    pub fn idle(&self) -> usize {
        self.inner.idle.lock().len()
    }
}

impl std::fmt::Debug for EncoderPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncoderPool")
            .field("level", &self.inner.level.level())
            .field("capacity", &self.inner.capacity)
            .field("idle", &self.idle())
            .finish()
    }
}

/// An encoder on loan from an [`EncoderPool`].
pub struct PooledEncoder {
    pool: Arc<PoolInner>,
    compress: Option<Compress>,
    finished: bool,
}

impl PooledEncoder {
    pub(crate) fn compress(&mut self) -> Option<&mut Compress> {
        self.compress.as_mut()
    }

    /// Marks the stream as complete so the encoder is recycled on drop.
    pub(crate) fn mark_finished(&mut self) {
        self.finished = true;
    }
}

impl Drop for PooledEncoder {
    fn drop(&mut self) {
        if !self.finished {
            return;
        }
        if let Some(mut compress) = self.compress.take() {
            compress.reset();
            let mut idle = self.pool.idle.lock();
            if idle.len() < self.pool.capacity {
                idle.push(compress);
            }
        }
    }
}
