//! Rate limiting for preventing service overload
//!
//! Token bucket admission control. The bucket holds up to `capacity` tokens
//! and refills continuously at `refill_rate_per_second`. Refill is computed
//! lazily from the elapsed time on every access. The optional background
//! refill task only folds a full bucket back into its stored balance;
//! correctness never depends on it.

use super::error::ConfigError;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Configuration for a token bucket
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimiterConfig {
    /// Maximum number of tokens the bucket can hold
    pub capacity: u32,
    /// Tokens added per second of elapsed time
    pub refill_rate_per_second: f64,
    /// Period of the optional background refill task
    pub refill_interval: Duration,
    /// How often [`RateLimiter::acquire`] re-checks the bucket while waiting
    pub poll_interval: Duration,
}

impl RateLimiterConfig {
    /// Create a config with the default refill and poll intervals
    pub fn new(capacity: u32, refill_rate_per_second: f64) -> Self {
        Self {
            capacity,
            refill_rate_per_second,
            refill_interval: Duration::from_secs(1),
            poll_interval: Duration::from_millis(10),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroThreshold { field: "capacity" });
        }
        if !self.refill_rate_per_second.is_finite() || self.refill_rate_per_second <= 0.0 {
            return Err(ConfigError::InvalidRate {
                field: "refill_rate_per_second",
                value: self.refill_rate_per_second,
            });
        }
        if self.refill_interval.is_zero() {
            return Err(ConfigError::ZeroDuration {
                field: "refill_interval",
            });
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroDuration {
                field: "poll_interval",
            });
        }
        Ok(())
    }
}

/// Balance is recorded at an anchor instant and the live count is derived
/// from it. Reads never move the anchor, so frequent access cannot shave off
/// fractional refill through repeated rounding.
#[derive(Debug)]
struct TokenBucket {
    capacity: f64,
    refill_rate: f64,
    balance: f64,
    anchor: Instant,
}

impl TokenBucket {
    fn full(capacity: u32, refill_rate: f64) -> Self {
        Self {
            capacity: f64::from(capacity),
            refill_rate,
            balance: f64::from(capacity),
            anchor: Instant::now(),
        }
    }

    /// Tokens available at `now`, capped at capacity
    fn available(&self, now: Instant) -> f64 {
        // Whole nanoseconds keep the product exact for any realistic window
        let elapsed_nanos = now.saturating_duration_since(self.anchor).as_nanos() as f64;
        let earned = elapsed_nanos * self.refill_rate / 1e9;
        (self.balance + earned).min(self.capacity)
    }

    /// Rebase a bucket that has filled up; a partial balance keeps its anchor
    fn refill(&mut self, now: Instant) {
        if self.available(now) >= self.capacity {
            self.balance = self.capacity;
            self.anchor = now;
        }
    }

    /// Take `wanted` tokens if available, rebasing on the new balance
    fn try_take(&mut self, now: Instant, wanted: f64) -> bool {
        let tokens = self.available(now);
        if tokens >= wanted {
            self.balance = tokens - wanted;
            self.anchor = now;
            true
        } else {
            false
        }
    }

    fn fill(&mut self, now: Instant) {
        self.balance = self.capacity;
        self.anchor = now;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Rate limiter using token bucket algorithm
///
/// Clones share the same bucket. The check-then-take in
/// [`try_acquire`](Self::try_acquire) runs under a short synchronous lock and
/// never awaits, so concurrent callers always see a consistent token count.
///
/// # Example
/// ```no_run
/// use rampart_core_resilience::{RateLimiter, RateLimiterConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), std::io::Error> {
///     // Burst of 100, sustained 100 requests per second
///     let limiter = RateLimiter::new(RateLimiterConfig::new(100, 100.0));
///
///     // Execute operation with rate limiting
///     let value = limiter.execute(|| async {
///         // Your operation here
///         Ok::<_, std::io::Error>(42)
///     }).await?;
///
///     assert_eq!(value, 42);
///     Ok(())
/// }
/// ```
#[derive(Clone, Debug)]
pub struct RateLimiter {
    config: Arc<RateLimiterConfig>,
    bucket: Arc<Mutex<TokenBucket>>,
    refill_task: Arc<Mutex<Option<AbortHandle>>>,
}

impl RateLimiter {
    /// Create a new rate limiter starting with a full bucket
    pub fn new(config: RateLimiterConfig) -> Self {
        let bucket = TokenBucket::full(config.capacity, config.refill_rate_per_second);
        Self {
            config: Arc::new(config),
            bucket: Arc::new(Mutex::new(bucket)),
            refill_task: Arc::new(Mutex::new(None)),
        }
    }

    /// Validate the configuration, then create the limiter
    pub fn try_new(config: RateLimiterConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(config))
    }

    /// Create a rate limiter with requests per second
    ///
    /// The burst size equals the per-second rate.
    pub fn per_second(requests_per_second: u32) -> Self {
        Self::new(RateLimiterConfig::new(
            requests_per_second,
            f64::from(requests_per_second),
        ))
    }

    /// Create a rate limiter with requests per minute
    ///
    /// The burst size equals the per-minute budget.
    pub fn per_minute(requests_per_minute: u32) -> Self {
        Self::new(RateLimiterConfig::new(
            requests_per_minute,
            f64::from(requests_per_minute) / 60.0,
        ))
    }

    /// Get the configuration
    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Take `permits` tokens if they are available right now
    ///
    /// Returns `false` and leaves the bucket untouched when there are not
    /// enough tokens. Elapsed time is credited either way.
    pub fn try_acquire(&self, permits: u32) -> bool {
        lock(&self.bucket).try_take(Instant::now(), f64::from(permits))
    }

    /// Wait until `permits` tokens are available and take them
    ///
    /// Polls the bucket every `poll_interval`. There is no upper bound on the
    /// wait; wrap the call in `tokio::time::timeout` if you need one. A request
    /// larger than the capacity can never be granted.
    pub async fn acquire(&self, permits: u32) {
        if permits > self.config.capacity {
            warn!(
                permits,
                capacity = self.config.capacity,
                "Rate limiter request exceeds bucket capacity and will never be granted"
            );
        }

        while !self.try_acquire(permits) {
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Execute an operation once a single token is available
    ///
    /// The operation's result is returned unchanged.
    pub async fn execute<F, Fut, T, E>(&self, op: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_with_permits(1, op).await
    }

    /// Execute an operation after acquiring `permits` tokens
    pub async fn execute_with_permits<F, Fut, T, E>(&self, permits: u32, op: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.acquire(permits).await;
        op().await
    }

    /// Whole tokens currently available, after crediting elapsed time
    pub fn get_available_tokens(&self) -> u32 {
        lock(&self.bucket).available(Instant::now()).floor() as u32
    }

    /// Refill the bucket to capacity immediately
    pub fn reset(&self) {
        lock(&self.bucket).fill(Instant::now());
    }

    /// Start the background refill task
    ///
    /// Returns `None` if a refill task is already running or when called
    /// outside a Tokio runtime. The task keeps running until it is
    /// stopped through the returned handle or [`stop_auto_refill`](Self::stop_auto_refill);
    /// it also ends on its own once every clone of this limiter is dropped.
    pub fn start_auto_refill(&self) -> Option<AutoRefillHandle> {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("Auto-refill requires a Tokio runtime, not started");
            return None;
        };

        let mut slot = lock(&self.refill_task);
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            debug!("Auto-refill already running");
            return None;
        }

        let weak = Arc::downgrade(&self.bucket);
        let period = self.config.refill_interval.max(Duration::from_millis(1));

        let handle = runtime.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                let Some(bucket) = weak.upgrade() else {
                    debug!("Rate limiter dropped, auto-refill exiting");
                    break;
                };
                lock(&bucket).refill(Instant::now());
            }
        });

        debug!(period = ?period, "Auto-refill started");
        *slot = Some(handle.abort_handle());
        Some(AutoRefillHandle { handle })
    }

    /// Stop the background refill task
    ///
    /// Returns `true` if a running task was stopped.
    pub fn stop_auto_refill(&self) -> bool {
        match lock(&self.refill_task).take() {
            Some(task) if !task.is_finished() => {
                task.abort();
                debug!("Auto-refill stopped");
                true
            }
            _ => false,
        }
    }

    /// Check whether the background refill task is running
    pub fn is_auto_refilling(&self) -> bool {
        lock(&self.refill_task)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

/// Owned handle to a rate limiter's background refill task
///
/// Dropping the handle does not stop the task.
#[derive(Debug)]
pub struct AutoRefillHandle {
    handle: JoinHandle<()>,
}

impl AutoRefillHandle {
    /// Stop the refill task
    pub fn stop(self) {
        self.handle.abort();
    }

    /// Check whether the refill task is still running
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}
