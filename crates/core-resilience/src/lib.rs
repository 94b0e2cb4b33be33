//! Rampart Core Resilience: Pure-logic fault tolerance primitives
//!
//! # Overview
//!
//! This crate provides three building blocks for calling dependencies that
//! sometimes fail:
//!
//! - **Circuit Breaker**: Fails fast while a dependency is unhealthy and probes for recovery
//! - **Rate Limiter**: Token bucket admission control bounding throughput
//! - **Retry Handler**: Re-runs failed operations with capped exponential backoff
//!
//! # Key Principles
//!
//! This crate is **pure logic** with zero knowledge of:
//! - Configuration formats or files
//! - Network protocols
//! - Application-specific error types
//!
//! The primitives share no state. Composition happens at the call site by
//! nesting one `execute` inside another.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         Your Application                │
//! └─────────────┬───────────────────────────┘
//!               │
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Retry Handler                     │  ← Re-attempt with backoff
//! │  (Budget, predicate, observer)          │
//! └─────────────┬───────────────────────────┘
//!               │
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Rate Limiter                      │  ← Prevent overload
//! │  (Token bucket, lazy refill)            │
//! └─────────────┬───────────────────────────┘
//!               │
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Circuit Breaker                   │  ← Fail-fast protection
//! │  (Closed / Open / HalfOpen, timeout)    │
//! └─────────────┬───────────────────────────┘
//!               │
//!               ▼
//!         External Service
//! ```
//!
//! # Usage Example
//!
//! ```no_run
//! use rampart_core_resilience::prelude::*;
//! use std::time::Duration;
//!
//! # async fn fetch() -> Result<String, std::io::Error> { Ok(String::new()) }
//! # async fn example() -> Result<(), ResilienceError<std::io::Error>> {
//! let breaker = CircuitBreaker::new(CircuitBreakerConfig {
//!     failure_threshold: 5,
//!     reset_timeout: Duration::from_secs(30),
//!     ..Default::default()
//! });
//! let limiter = RateLimiter::new(RateLimiterConfig::new(10, 5.0));
//! let retry = RetryHandler::new(RetryConfig::default())
//!     .with_should_retry(|e: &ResilienceError<std::io::Error>| !e.is_circuit_open());
//!
//! let body = retry
//!     .execute(|| limiter.execute(|| breaker.execute(fetch)))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod error;
pub mod rate_limiter;
pub mod retry;

// Re-export main types for convenience
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState, StateListener};
pub use error::{ConfigError, ErrorKind, ResilienceError};
pub use rate_limiter::{AutoRefillHandle, RateLimiter, RateLimiterConfig};
pub use retry::{RetryConfig, RetryHandler, RetryObserver, RetryPredicate, Retrying};

/// Prelude module for convenient imports
///
/// # Example
/// ```
/// use rampart_core_resilience::prelude::*;
/// ```
pub mod prelude {
    pub use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
    pub use super::error::{ConfigError, ErrorKind, ResilienceError};
    pub use super::rate_limiter::{RateLimiter, RateLimiterConfig};
    pub use super::retry::{RetryConfig, RetryHandler};
}
