//! Error types for the resilience primitives

use std::time::Duration;
use thiserror::Error;

/// Errors produced by [`CircuitBreaker::execute`](crate::CircuitBreaker::execute)
///
/// The breaker adds exactly two synthetic kinds on top of the wrapped
/// operation's own error type, which is carried untouched in `Inner`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResilienceError<E> {
    /// Circuit breaker is open, the operation was not invoked
    #[error("Circuit breaker is open, rejecting requests")]
    CircuitOpen,

    /// The operation did not finish within the per-call timeout
    #[error("Operation timeout after {0:?}")]
    Timeout(Duration),

    /// The operation itself failed
    #[error("{0}")]
    Inner(E),
}

/// Fieldless discriminant of [`ResilienceError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Rejected by an open circuit
    CircuitOpen,
    /// Call exceeded the breaker's timeout
    Timeout,
    /// The wrapped operation returned an error
    Operation,
}

impl<E> ResilienceError<E> {
    /// Classify this error without borrowing the payload
    pub fn kind(&self) -> ErrorKind {
        match self {
            ResilienceError::CircuitOpen => ErrorKind::CircuitOpen,
            ResilienceError::Timeout(_) => ErrorKind::Timeout,
            ResilienceError::Inner(_) => ErrorKind::Operation,
        }
    }

    /// Check if the breaker refused the call
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, ResilienceError::CircuitOpen)
    }

    /// Check if the per-call timeout elapsed
    pub fn is_timeout(&self) -> bool {
        matches!(self, ResilienceError::Timeout(_))
    }

    /// Borrow the operation's error, if this is one
    pub fn inner(&self) -> Option<&E> {
        match self {
            ResilienceError::Inner(e) => Some(e),
            _ => None,
        }
    }

    /// Take the operation's error, if this is one
    pub fn into_inner(self) -> Option<E> {
        match self {
            ResilienceError::Inner(e) => Some(e),
            _ => None,
        }
    }
}

/// Invalid configuration for one of the primitives
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A count threshold or capacity was zero
    #[error("{field} must be at least 1")]
    ZeroThreshold { field: &'static str },

    /// A duration that must elapse was zero
    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },

    /// A rate was zero, negative, NaN or infinite
    #[error("{field} must be a positive finite number, got {value}")]
    InvalidRate { field: &'static str, value: f64 },

    /// Backoff base below 1 would shrink delays
    #[error("exponential_base must be a finite number >= 1, got {0}")]
    InvalidBase(f64),

    /// Backoff starts above its own cap
    #[error("initial_delay ({initial:?}) exceeds max_delay ({max:?})")]
    DelayOrder { initial: Duration, max: Duration },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let open: ResilienceError<String> = ResilienceError::CircuitOpen;
        assert!(open.is_circuit_open());
        assert!(!open.is_timeout());
        assert_eq!(open.kind(), ErrorKind::CircuitOpen);
        assert!(open.inner().is_none());

        let timeout: ResilienceError<String> = ResilienceError::Timeout(Duration::from_millis(5));
        assert!(timeout.is_timeout());
        assert_eq!(timeout.kind(), ErrorKind::Timeout);

        let inner = ResilienceError::Inner("boom".to_string());
        assert_eq!(inner.kind(), ErrorKind::Operation);
        assert_eq!(inner.inner().map(String::as_str), Some("boom"));
        assert_eq!(inner.into_inner(), Some("boom".to_string()));
    }

    #[test]
    fn test_inner_display_is_transparent() {
        let err = ResilienceError::Inner("connection refused".to_string());
        assert_eq!(err.to_string(), "connection refused");
        assert_eq!(
            ResilienceError::<String>::CircuitOpen.to_string(),
            "Circuit breaker is open, rejecting requests"
        );
    }

    #[test]
    fn test_config_error_messages() {
        let err = ConfigError::ZeroThreshold {
            field: "failure_threshold",
        };
        assert_eq!(err.to_string(), "failure_threshold must be at least 1");

        let err = ConfigError::InvalidBase(0.5);
        assert!(err.to_string().contains("0.5"));
    }
}
