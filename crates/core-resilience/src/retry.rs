//! Retry with exponential backoff
//!
//! A [`RetryHandler`] re-runs a fallible operation until it succeeds, the
//! error is rejected by the retry predicate, or the retry budget is spent.
//! The delay before retry `n` (0-based) is
//! `min(initial_delay * exponential_base^n, max_delay)`.
//!
//! On terminal failure the last error is returned as-is; there is no
//! "retries exhausted" wrapper, so callers can still match on their own
//! error type.

use super::error::ConfigError;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Multiplier applied to the delay on each retry
    pub exponential_base: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            exponential_base: 2.0,
        }
    }
}

impl RetryConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.exponential_base.is_finite() || self.exponential_base < 1.0 {
            return Err(ConfigError::InvalidBase(self.exponential_base));
        }
        if self.initial_delay > self.max_delay {
            return Err(ConfigError::DelayOrder {
                initial: self.initial_delay,
                max: self.max_delay,
            });
        }
        Ok(())
    }
}

/// Decides whether an error is worth retrying
pub type RetryPredicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Called before each retry with the 1-based number of the failed attempt
pub type RetryObserver<E> = Arc<dyn Fn(u32, &E) + Send + Sync>;

/// Re-executes fallible operations with exponential backoff
///
/// Holds no state between calls; every `execute` starts from attempt zero.
///
/// # Example
/// ```no_run
/// use rampart_core_resilience::{RetryConfig, RetryHandler};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), std::io::Error> {
/// let retry = RetryHandler::new(RetryConfig {
///     max_retries: 5,
///     initial_delay: Duration::from_millis(200),
///     ..Default::default()
/// })
/// .with_should_retry(|e: &std::io::Error| e.kind() != std::io::ErrorKind::NotFound);
///
/// let body = retry.execute(|| async { std::fs::read_to_string("/etc/hostname") }).await?;
/// # Ok(())
/// # }
/// ```
pub struct RetryHandler<E> {
    config: RetryConfig,
    should_retry: Option<RetryPredicate<E>>,
    on_retry: Option<RetryObserver<E>>,
}

impl<E> Clone for RetryHandler<E> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            should_retry: self.should_retry.clone(),
            on_retry: self.on_retry.clone(),
        }
    }
}

impl<E> fmt::Debug for RetryHandler<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryHandler")
            .field("config", &self.config)
            .field("should_retry", &self.should_retry.as_ref().map(|_| "<fn>"))
            .field("on_retry", &self.on_retry.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl<E> Default for RetryHandler<E> {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

impl<E> RetryHandler<E> {
    /// Create a handler that retries every error
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            should_retry: None,
            on_retry: None,
        }
    }

    /// Validate the configuration, then create the handler
    pub fn try_new(config: RetryConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(config))
    }

    /// Only retry errors for which `predicate` returns `true`
    pub fn with_should_retry<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Some(Arc::new(predicate));
        self
    }

    /// Observe each retry before its backoff delay
    pub fn with_on_retry<O>(mut self, observer: O) -> Self
    where
        O: Fn(u32, &E) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(observer));
        self
    }

    /// Get the configuration
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Backoff delay before retry number `attempt` (0-based)
    ///
    /// Saturates at `max_delay`; never panics on overflow.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let cap = self.config.max_delay;
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let factor = self.config.exponential_base.powi(exponent);
        let nanos = self.config.initial_delay.as_nanos() as f64 * factor;

        if nanos >= cap.as_nanos() as f64 {
            cap
        } else {
            // NaN (zero initial delay times an infinite factor) maps to zero
            Duration::from_nanos(nanos.round() as u64)
        }
    }

    /// Execute an operation, sleeping with exponential backoff between attempts
    ///
    /// Makes at most `max_retries + 1` attempts.
    pub async fn execute<F, Fut, T>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;

        loop {
            match op().await {
                Ok(result) => {
                    if attempt > 0 {
                        debug!(retries = attempt, "Operation succeeded after retrying");
                    }
                    return Ok(result);
                }
                Err(e) => match self.prepare_retry(attempt, &e) {
                    Some(delay) => {
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => return Err(e),
                },
            }
        }
    }

    /// Execute a blocking operation with the same attempt and predicate rules
    ///
    /// Retries happen back to back: the backoff delay is computed and
    /// reported but never slept, so the calling thread is not blocked.
    pub fn execute_sync<F, T>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
    {
        let mut attempt = 0;

        loop {
            match op() {
                Ok(result) => return Ok(result),
                Err(e) => match self.prepare_retry(attempt, &e) {
                    Some(delay) => {
                        debug!(skipped_delay = ?delay, "Synchronous retry without backoff");
                        attempt += 1;
                    }
                    None => return Err(e),
                },
            }
        }
    }

    /// Decorate `f` so that every call runs under `handler`
    pub fn wrap<F>(f: F, handler: Self) -> Retrying<F, E> {
        Retrying {
            f,
            handler: Arc::new(handler),
        }
    }

    /// Returns the delay before the next attempt, or `None` to give up
    fn prepare_retry(&self, attempt: u32, error: &E) -> Option<Duration> {
        if attempt >= self.config.max_retries {
            debug!(
                attempts = attempt.saturating_add(1),
                "Retry budget exhausted, returning last error"
            );
            return None;
        }

        if let Some(should_retry) = &self.should_retry {
            if !should_retry(error) {
                debug!(attempt = attempt + 1, "Error is not retryable");
                return None;
            }
        }

        if let Some(on_retry) = &self.on_retry {
            on_retry(attempt + 1, error);
        }

        let delay = self.delay_for_attempt(attempt);
        debug!(attempt = attempt + 1, delay = ?delay, "Retrying operation");
        Some(delay)
    }
}

/// A function decorated with a shared [`RetryHandler`]
///
/// Created by [`RetryHandler::wrap`]. The argument is cloned for each
/// attempt; pass a tuple for several arguments or `()` for none.
pub struct Retrying<F, E> {
    f: F,
    handler: Arc<RetryHandler<E>>,
}

impl<F: Clone, E> Clone for Retrying<F, E> {
    fn clone(&self) -> Self {
        Self {
            f: self.f.clone(),
            handler: self.handler.clone(),
        }
    }
}

impl<F, E> fmt::Debug for Retrying<F, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retrying")
            .field("handler", &self.handler)
            .finish_non_exhaustive()
    }
}

impl<F, E> Retrying<F, E> {
    /// Call the wrapped function with retries
    pub async fn call<A, Fut, T>(&self, arg: A) -> Result<T, E>
    where
        A: Clone,
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.handler.execute(|| (self.f)(arg.clone())).await
    }

    /// The handler shared by every call
    pub fn handler(&self) -> &RetryHandler<E> {
        &self.handler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::time::Instant;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum TestError {
        Transient(usize),
        Fatal(usize),
    }

    fn fast_config(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            exponential_base: 2.0,
        }
    }

    #[test]
    fn test_default_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert_eq!(config.exponential_base, 2.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_exponential_backoff() {
        let retry: RetryHandler<TestError> = RetryHandler::new(fast_config(10));

        assert_eq!(retry.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(retry.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(retry.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(retry.delay_for_attempt(3), Duration::from_millis(800));
        assert_eq!(retry.delay_for_attempt(4), Duration::from_secs(1));
        assert_eq!(retry.delay_for_attempt(u32::MAX), Duration::from_secs(1));
    }

    #[test]
    fn test_zero_initial_delay_stays_zero() {
        let retry: RetryHandler<TestError> = RetryHandler::new(RetryConfig {
            initial_delay: Duration::ZERO,
            ..Default::default()
        });
        assert_eq!(retry.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(retry.delay_for_attempt(5000), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_last_allowed_attempt() {
        let retry = RetryHandler::new(fast_config(3));
        let counter = AtomicUsize::new(0);
        let calls = &counter;

        let start = Instant::now();
        let result = retry
            .execute(|| async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n <= 3 {
                    Err(TestError::Transient(n))
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_eq!(result, Ok(4));
        assert_eq!(counter.load(Ordering::SeqCst), 4);
        // 100 + 200 + 400 ms of backoff
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(700));
        assert!(elapsed < Duration::from_millis(800));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_error() {
        let retry = RetryHandler::new(fast_config(3));
        let counter = AtomicUsize::new(0);
        let calls = &counter;

        let result: Result<(), _> = retry
            .execute(|| async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Err(TestError::Transient(n))
            })
            .await;

        assert_eq!(result, Err(TestError::Transient(4)));
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_propagates_immediately() {
        let retry = RetryHandler::new(fast_config(3))
            .with_should_retry(|e: &TestError| matches!(e, TestError::Transient(_)));
        let counter = AtomicUsize::new(0);
        let calls = &counter;

        let start = Instant::now();
        let result: Result<(), _> = retry
            .execute(|| async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Err(TestError::Fatal(n))
            })
            .await;

        assert_eq!(result, Err(TestError::Fatal(1)));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_predicate_stops_mid_sequence() {
        let retry = RetryHandler::new(fast_config(5))
            .with_should_retry(|e: &TestError| matches!(e, TestError::Transient(_)));
        let counter = AtomicUsize::new(0);
        let calls = &counter;

        let result: Result<(), _> = retry
            .execute(|| async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(TestError::Transient(n))
                } else {
                    Err(TestError::Fatal(n))
                }
            })
            .await;

        assert_eq!(result, Err(TestError::Fatal(3)));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_retry_sees_each_failed_attempt() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let retry = RetryHandler::new(fast_config(3))
            .with_on_retry(move |attempt, e: &TestError| sink.lock().unwrap().push((attempt, e.clone())));

        let result: Result<(), _> = retry.execute(|| async { Err(TestError::Transient(0)) }).await;
        assert!(result.is_err());

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (1, TestError::Transient(0)),
                (2, TestError::Transient(0)),
                (3, TestError::Transient(0)),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_makes_single_attempt() {
        let retry = RetryHandler::new(fast_config(0));
        let counter = AtomicUsize::new(0);
        let calls = &counter;

        let result: Result<(), _> = retry
            .execute(|| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TestError::Transient(1))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_execute_sync_skips_backoff() {
        let retry = RetryHandler::new(RetryConfig {
            max_retries: 4,
            initial_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(60),
            exponential_base: 2.0,
        });
        let mut calls = 0;

        let start = std::time::Instant::now();
        let result: Result<(), _> = retry.execute_sync(|| {
            calls += 1;
            Err(TestError::Transient(calls))
        });

        assert_eq!(result, Err(TestError::Transient(5)));
        assert_eq!(calls, 5);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_execute_sync_respects_predicate() {
        let retry = RetryHandler::new(fast_config(3)).with_should_retry(|_: &TestError| false);
        let mut calls = 0;

        let result: Result<(), _> = retry.execute_sync(|| {
            calls += 1;
            Err(TestError::Transient(calls))
        });

        assert_eq!(result, Err(TestError::Transient(1)));
        assert_eq!(calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrap_shares_handler_across_calls() {
        let retries = Arc::new(AtomicUsize::new(0));
        let counter = retries.clone();
        let handler = RetryHandler::new(fast_config(2)).with_on_retry(move |_, _: &TestError| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let attempts = Arc::new(AtomicUsize::new(0));
        let seen = attempts.clone();
        let double = RetryHandler::wrap(
            move |x: u32| {
                let seen = seen.clone();
                async move {
                    // Every other attempt fails
                    if seen.fetch_add(1, Ordering::SeqCst) % 2 == 0 {
                        Err(TestError::Transient(x as usize))
                    } else {
                        Ok(x * 2)
                    }
                }
            },
            handler,
        );

        assert_eq!(double.call(21).await, Ok(42));
        assert_eq!(double.clone().call(5).await, Ok(10));
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        assert_eq!(retries.load(Ordering::SeqCst), 2);
        assert_eq!(double.handler().config().max_retries, 2);
    }

    #[test]
    fn test_config_validation() {
        let config = RetryConfig {
            exponential_base: 0.5,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidBase(0.5)));

        let config = RetryConfig {
            initial_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(1),
            ..Default::default()
        };
        assert!(RetryHandler::<TestError>::try_new(config).is_err());
    }
}
