use hashbrown::HashMap;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};

/// Lower bound for the adaptive recomputation interval.
pub const MIN_ADAPTIVE_INTERVAL: Duration = Duration::from_secs(10);

/// Reports current system load for adaptive admission.
pub trait LoadSource: Send + Sync {
    /// Load in `[0, 1]`; out-of-range values are clamped.
    fn load(&self) -> f64;
}

impl<F> LoadSource for F
where
    F: Fn() -> f64 + Send + Sync,
{
    fn load(&self) -> f64 {
        self()
    }
}

/// Fraction of the base rate granted at a given load.
pub fn rate_factor(load: f64) -> f64 {
    if load > 0.8 {
        0.5
    } else if load > 0.6 {
        0.75
    } else {
        1.0
    }
}

/// Token bucket for one client identity.
#[derive(Debug, Clone)]
pub(crate) struct ClientBucket {
    tokens: f64,
    last_refill: Instant,
    last_seen: Instant,
}

impl ClientBucket {
    fn full(burst: f64, now: Instant) -> Self {
        Self {
            tokens: burst,
            last_refill: now,
            last_seen: now,
        }
    }

    fn refill(&mut self, now: Instant, rate: f64, burst: f64) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate).min(burst);
        self.last_refill = now;
    }

    /// Consumes one token, or returns how long until one is available.
    fn try_take(&mut self, now: Instant, rate: f64, burst: f64) -> Result<(), Duration> {
        self.refill(now, rate, burst);
        self.last_seen = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            return Ok(());
        }

        let missing = 1.0 - self.tokens;
        Err(Duration::try_from_secs_f64(missing / rate).unwrap_or(Duration::MAX))
    }
}

/// Outcome of an adaptive rate recomputation that changed the rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateAdjustment {
    /// Load reported by the [`LoadSource`], clamped to `[0, 1]`.
    pub load: f64,
    /// Effective rate before the change, in tokens per second.
    pub previous_rate: f64,
    /// Effective rate from now on.
    pub current_rate: f64,
}

struct Adaptive {
    source: Arc<dyn LoadSource>,
    interval: Duration,
    last_adjusted: Mutex<Instant>,
}

/// Per-client token buckets shared by every clone of a rate limiter.
///
/// The client map lock is only held to look up or insert a bucket. Each bucket
/// carries its own lock, so admissions for one client are linearized while
/// unrelated clients never wait on each other's bucket.
pub struct AdmissionController {
    buckets: Mutex<HashMap<String, Arc<Mutex<ClientBucket>>>>,
    base_rate: f64,
    burst: f64,
    idle_ttl: Duration,
    sweep_interval: Duration,
    effective_rate: AtomicU64,
    adaptive: Option<Adaptive>,
    sweeper_started: AtomicBool,
}

impl AdmissionController {
    /// Creates a controller refilling `requests_per_second` tokens per second
    /// into buckets holding at most `burst` tokens.
    pub fn new(requests_per_second: f64, burst: u32) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            base_rate: requests_per_second,
            burst: f64::from(burst),
            idle_ttl: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(60),
            effective_rate: AtomicU64::new(requests_per_second.to_bits()),
            adaptive: None,
            sweeper_started: AtomicBool::new(false),
        }
    }

    /// Sets how long a bucket may sit unused before the sweep drops it, and
    /// how often the background sweep runs.
    pub fn with_idle_ttl(mut self, idle_ttl: Duration, sweep_interval: Duration) -> Self {
        self.idle_ttl = idle_ttl;
        self.sweep_interval = sweep_interval;
        self
    }

    /// Scales the refill rate with the load reported by `source`, re-reading it
    /// at most once per `interval` (never more often than
    /// [`MIN_ADAPTIVE_INTERVAL`]).
    pub fn with_load_source(mut self, source: Arc<dyn LoadSource>, interval: Duration) -> Self {
        self.adaptive = Some(Adaptive {
            source,
            interval: interval.max(MIN_ADAPTIVE_INTERVAL),
            last_adjusted: Mutex::new(Instant::now()),
        });
        self
    }

    /// Checks and charges the client's bucket.
    pub fn admit(&self, client: &str) -> bool {
        self.try_admit(client).is_ok()
    }

    /// Like [`admit`](Self::admit), returning the time until a token is
    /// available on rejection.
    pub fn try_admit(&self, client: &str) -> Result<(), Duration> {
        let bucket = {
            let mut buckets = self.buckets.lock();
            match buckets.get(client) {
                Some(bucket) => Arc::clone(bucket),
                None => {
                    let bucket = ClientBucket::full(self.burst, Instant::now());
                    let bucket = Arc::new(Mutex::new(bucket));
                    buckets.insert(client.to_owned(), Arc::clone(&bucket));
                    bucket
                }
            }
        };

        let mut bucket = bucket.lock();
        bucket.try_take(Instant::now(), self.effective_rate(), self.burst)
    }

    /// Removes buckets idle for longer than the idle TTL and returns how many
    /// were dropped. Buckets held by an in-progress admission are kept.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut buckets = self.buckets.lock();
        let before = buckets.len();

        buckets.retain(|_, bucket| {
            if Arc::strong_count(bucket) > 1 {
                return true;
            }
            match bucket.try_lock() {
                Some(b) => now.saturating_duration_since(b.last_seen) <= self.idle_ttl,
                None => true,
            }
        });

        let removed = before - buckets.len();

        #[cfg(feature = "metrics")]
        metrics::gauge!("ratelimiter_tracked_clients").set(buckets.len() as f64);

        removed
    }

    /// Number of client buckets currently tracked.
    pub fn bucket_count(&self) -> usize {
        self.buckets.lock().len()
    }

    /// Tokens per second used for refills right now.
    pub fn effective_rate(&self) -> f64 {
        f64::from_bits(self.effective_rate.load(Ordering::Acquire))
    }

    /// Configured rate before any adaptive scaling.
    pub fn base_rate(&self) -> f64 {
        self.base_rate
    }

    /// Bucket capacity.
    pub fn burst(&self) -> u32 {
        self.burst as u32
    }

    /// Re-reads the load source if the adaptive interval has elapsed.
    ///
    /// Returns the adjustment when the effective rate changed. Without a load
    /// source this is a no-op.
    pub fn adjust_rate(&self) -> Option<RateAdjustment> {
        let adaptive = self.adaptive.as_ref()?;
        let now = Instant::now();

        // Another caller is already recomputing.
        let mut last = adaptive.last_adjusted.try_lock()?;
        if now.saturating_duration_since(*last) < adaptive.interval {
            return None;
        }
        *last = now;

        let load = adaptive.source.load().clamp(0.0, 1.0);
        let current_rate = self.base_rate * rate_factor(load);
        let previous_rate =
            f64::from_bits(self.effective_rate.swap(current_rate.to_bits(), Ordering::AcqRel));

        (previous_rate != current_rate).then_some(RateAdjustment {
            load,
            previous_rate,
            current_rate,
        })
    }

    /// Starts the periodic idle sweep on the current tokio runtime, once.
    ///
    /// The task holds a weak reference and exits when the controller is
    /// dropped. Outside a runtime nothing is spawned and a later call retries.
    pub(crate) fn ensure_sweeper(self: &Arc<Self>) {
        if self.sweeper_started.load(Ordering::Acquire)
            || self.sweeper_started.swap(true, Ordering::AcqRel)
        {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            self.sweeper_started.store(false, Ordering::Release);
            return;
        };

        let every = self.sweep_interval;
        let controller = Arc::downgrade(self);
        handle.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(controller) = controller.upgrade() else {
                    break;
                };
                let _removed = controller.sweep();

                #[cfg(feature = "tracing")]
                if _removed > 0 {
                    tracing::debug!(
                        removed = _removed,
                        remaining = controller.bucket_count(),
                        "swept idle client buckets"
                    );
                }
            }
        });
    }
}

impl fmt::Debug for AdmissionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionController")
            .field("base_rate", &self.base_rate)
            .field("effective_rate", &self.effective_rate())
            .field("burst", &self.burst)
            .field("idle_ttl", &self.idle_ttl)
            .field("adaptive", &self.adaptive.is_some())
            .finish()
    }
}
