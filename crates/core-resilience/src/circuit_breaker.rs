//! Circuit Breaker implementation for fault tolerance
//!
//! The circuit breaker prevents cascading failures by failing fast when a service
//! is experiencing issues. It has three states:
//! - Closed: Normal operation, requests pass through
//! - Open: Service is unhealthy, requests fail immediately
//! - HalfOpen: Testing if service has recovered
//!
//! Transitions out of Open are lazy: nothing runs in the background, the first
//! call made after the reset timeout moves the breaker to HalfOpen and goes
//! through as a probe.

use super::error::{ConfigError, ResilienceError};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Roughly 30 years, used when `now + reset_timeout` overflows
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// State of the circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    /// Circuit is closed, requests pass through normally
    Closed,
    /// Circuit is open, requests fail immediately until the next attempt time
    Open,
    /// Circuit is half-open, testing service recovery
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Observer invoked with `(from, to)` on every state transition
pub type StateListener = Arc<dyn Fn(CircuitState, CircuitState) + Send + Sync>;

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening circuit
    pub failure_threshold: usize,
    /// Number of consecutive successes in half-open to close circuit
    pub success_threshold: usize,
    /// Maximum time a single call may take before it counts as a failure
    pub call_timeout: Duration,
    /// Duration to wait before transitioning from open to half-open
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            call_timeout: Duration::from_secs(60),
            reset_timeout: Duration::from_secs(30),
        }
    }
}

impl CircuitBreakerConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::ZeroThreshold {
                field: "failure_threshold",
            });
        }
        if self.success_threshold == 0 {
            return Err(ConfigError::ZeroThreshold {
                field: "success_threshold",
            });
        }
        if self.call_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration {
                field: "call_timeout",
            });
        }
        if self.reset_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration {
                field: "reset_timeout",
            });
        }
        Ok(())
    }
}

/// Internal state of the circuit breaker
#[derive(Debug)]
struct CircuitBreakerState {
    /// Current state of the circuit
    state: CircuitState,
    /// Consecutive failure count
    consecutive_failures: usize,
    /// Consecutive success count (used in half-open state)
    consecutive_successes: usize,
    /// While open, calls before this instant are rejected
    next_attempt: Instant,
}

impl CircuitBreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            next_attempt: Instant::now(),
        }
    }
}

/// Circuit breaker for protecting against cascading failures
///
/// Clones share the same state, so one breaker can guard a dependency from
/// many tasks.
///
/// # Example
/// ```no_run
/// use rampart_core_resilience::{CircuitBreaker, CircuitBreakerConfig, ResilienceError};
///
/// #[tokio::main]
/// async fn main() -> Result<(), ResilienceError<std::io::Error>> {
///     let breaker = CircuitBreaker::new(CircuitBreakerConfig::default())
///         .with_state_listener(|from, to| println!("circuit {} -> {}", from, to));
///
///     let result = breaker.execute(|| async {
///         // Your operation here
///         Ok::<_, std::io::Error>(42)
///     }).await?;
///
///     println!("Result: {}", result);
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct CircuitBreaker {
    config: Arc<CircuitBreakerConfig>,
    state: Arc<Mutex<CircuitBreakerState>>,
    listener: Option<StateListener>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("listener", &self.listener.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config: Arc::new(config),
            state: Arc::new(Mutex::new(CircuitBreakerState::new())),
            listener: None,
        }
    }

    /// Create a new circuit breaker with default configuration
    pub fn new_default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }

    /// Validate the configuration, then create the breaker
    pub fn try_new(config: CircuitBreakerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(config))
    }

    /// Register an observer called synchronously on every state transition
    pub fn with_state_listener<L>(mut self, listener: L) -> Self
    where
        L: Fn(CircuitState, CircuitState) + Send + Sync + 'static,
    {
        self.listener = Some(Arc::new(listener));
        self
    }

    /// Get the configuration
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Get the current state of the circuit breaker
    pub async fn get_state(&self) -> CircuitState {
        let state = self.state.lock().await;
        state.state
    }

    /// Get current failure count
    pub async fn get_failure_count(&self) -> usize {
        let state = self.state.lock().await;
        state.consecutive_failures
    }

    /// Get current success count
    pub async fn get_success_count(&self) -> usize {
        let state = self.state.lock().await;
        state.consecutive_successes
    }

    /// Instant before which an open circuit rejects calls
    pub async fn next_attempt(&self) -> Instant {
        let state = self.state.lock().await;
        state.next_attempt
    }

    /// Reset the circuit breaker to closed state
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.consecutive_failures = 0;
        state.consecutive_successes = 0;
        state.next_attempt = Instant::now();
        self.transition(&mut state, CircuitState::Closed);
    }

    /// Close the circuit immediately, same as [`reset`](Self::reset)
    pub async fn force_close(&self) {
        self.reset().await;
    }

    /// Open the circuit immediately and arm the reset timeout
    pub async fn force_open(&self) {
        let mut state = self.state.lock().await;
        state.consecutive_successes = 0;
        self.trip(&mut state);
    }

    /// Execute an operation with circuit breaker protection
    ///
    /// Fails with [`ResilienceError::CircuitOpen`] without calling `op` while
    /// the circuit is open. Otherwise runs `op` under the call timeout; an
    /// operation error or a timeout both count as a failure. A timed-out
    /// operation future is dropped and can no longer affect the breaker.
    pub async fn execute<F, Fut, T, E>(&self, op: F) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.try_admit().await {
            return Err(ResilienceError::CircuitOpen);
        }

        match tokio::time::timeout(self.config.call_timeout, op()).await {
            Ok(Ok(result)) => {
                self.on_success().await;
                Ok(result)
            }
            Ok(Err(e)) => {
                self.on_failure().await;
                Err(ResilienceError::Inner(e))
            }
            Err(_) => {
                warn!(
                    timeout = ?self.config.call_timeout,
                    "Circuit breaker call timed out"
                );
                self.on_failure().await;
                Err(ResilienceError::Timeout(self.config.call_timeout))
            }
        }
    }

    /// Decide whether a call may proceed, moving Open to HalfOpen once the
    /// reset timeout has passed
    async fn try_admit(&self) -> bool {
        let mut state = self.state.lock().await;

        match state.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                if Instant::now() >= state.next_attempt {
                    state.consecutive_successes = 0;
                    self.transition(&mut state, CircuitState::HalfOpen);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Handle successful operation
    async fn on_success(&self) {
        let mut state = self.state.lock().await;

        match state.state {
            CircuitState::Closed => {
                state.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                state.consecutive_successes += 1;

                if state.consecutive_successes >= self.config.success_threshold {
                    state.consecutive_failures = 0;
                    state.consecutive_successes = 0;
                    self.transition(&mut state, CircuitState::Closed);
                }
            }
            CircuitState::Open => {
                // Admitted before another call tripped the breaker
                debug!("Ignoring late success while circuit is open");
            }
        }
    }

    /// Handle failed operation
    async fn on_failure(&self) {
        let mut state = self.state.lock().await;
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);

        match state.state {
            CircuitState::Closed => {
                if state.consecutive_failures >= self.config.failure_threshold {
                    self.trip(&mut state);
                }
            }
            CircuitState::HalfOpen => {
                // Any failure in half-open state reopens the circuit
                state.consecutive_successes = 0;
                self.trip(&mut state);
            }
            CircuitState::Open => {}
        }
    }

    /// Open the circuit and push the next attempt out by the reset timeout
    fn trip(&self, state: &mut CircuitBreakerState) {
        let now = Instant::now();
        state.next_attempt = now
            .checked_add(self.config.reset_timeout)
            .unwrap_or_else(|| now + FAR_FUTURE);
        self.transition(state, CircuitState::Open);
    }

    /// Move to `to`, notifying the listener only when the state changes
    fn transition(&self, state: &mut CircuitBreakerState, to: CircuitState) {
        let from = state.state;
        if from == to {
            return;
        }
        state.state = to;

        match to {
            CircuitState::Open => info!(
                %from,
                failures = state.consecutive_failures,
                reset_timeout = ?self.config.reset_timeout,
                "Circuit breaker opened"
            ),
            CircuitState::HalfOpen => debug!(%from, "Circuit breaker probing recovery"),
            CircuitState::Closed => info!(%from, "Circuit breaker closed"),
        }

        if let Some(listener) = &self.listener {
            listener(from, to);
        }
    }
}
