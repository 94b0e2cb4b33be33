/*!
 * Rampart - composable resilience primitives
 *
 * Rampart bundles three independent guards for calls into unreliable
 * dependencies:
 *
 * - [`CircuitBreaker`]: closed / open / half-open failure isolation with a per-call timeout
 * - [`RateLimiter`]: token bucket admission control with lazy refill
 * - [`RetryHandler`]: capped exponential backoff with a retry predicate
 *
 * The primitives live in the `rampart-core-resilience` crate and are
 * re-exported here together with the application layer: TOML profiles
 * ([`config`]), subscriber construction ([`logging`]) and the crate error
 * type ([`error`]).
 *
 * # Example
 *
 * ```no_run
 * use rampart::{CircuitBreaker, RateLimiter, ResilienceProfile, RetryHandler, ResilienceError};
 *
 * # async fn call() -> Result<u32, std::io::Error> { Ok(1) }
 * # async fn example() -> anyhow::Result<()> {
 * let profile = ResilienceProfile::from_toml_str(r#"
 *     [rate_limiter]
 *     capacity = 5
 *     refill_rate_per_second = 10.0
 * "#)?;
 *
 * let breaker = CircuitBreaker::new(profile.circuit_breaker_config());
 * let limiter = RateLimiter::new(profile.rate_limiter_config().unwrap());
 * let retry = RetryHandler::new(profile.retry_config())
 *     .with_should_retry(|e: &ResilienceError<std::io::Error>| !e.is_circuit_open());
 *
 * let value = retry
 *     .execute(|| limiter.execute(|| breaker.execute(call)))
 *     .await?;
 * # Ok(())
 * # }
 * ```
 */

pub mod config;
pub mod error;
pub mod logging;

pub use config::{LogLevel, LogSettings, ResilienceProfile};
pub use error::{RampartError, Result};

pub use rampart_core_resilience::{
    AutoRefillHandle, CircuitBreaker, CircuitBreakerConfig, CircuitState, ConfigError, ErrorKind,
    RateLimiter, RateLimiterConfig, ResilienceError, RetryConfig, RetryHandler, Retrying,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use super::config::ResilienceProfile;
    pub use rampart_core_resilience::prelude::*;
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, env!("CARGO_PKG_VERSION"));
    }
}
