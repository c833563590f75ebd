//! # Resilience Error Types
//!
//! Errors surfaced by the resilience layer. The guarded operation's own error is
//! never replaced: `CallError::Operation` and `FeatureError::Primary` carry the
//! original value so callers can still match on it.

use crate::config::ConfigurationError;
use crate::resilience::CircuitState;
use std::time::Duration;
use thiserror::Error;

/// Boxed error used by fallbacks and degraded implementations
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A breaker rejected a call without running it
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "Circuit breaker '{name}' is {state}; retry in {remaining_ms}ms",
    remaining_ms = .remaining_cooldown.as_millis()
)]
pub struct CircuitOpenError {
    /// Name of the breaker that rejected the call
    pub name: String,

    /// State the breaker was in when it rejected the call
    pub state: CircuitState,

    /// Time left until the breaker admits a probe call (zero while a probe is in flight)
    pub remaining_cooldown: Duration,
}

/// Outcome of a call guarded by a circuit breaker
#[derive(Debug, Error)]
pub enum CallError<E> {
    /// Rejected by the breaker; the operation was not invoked
    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpenError),

    /// The operation exceeded its time budget and was cancelled
    #[error("Call to '{component}' timed out after {timeout_ms}ms", timeout_ms = .timeout.as_millis())]
    Timeout { component: String, timeout: Duration },

    /// The operation's own error, unchanged
    #[error(transparent)]
    Operation(E),
}

impl<E> CallError<E> {
    /// True when the breaker rejected the call
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, CallError::CircuitOpen(_))
    }

    /// True when the call was cancelled by its timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, CallError::Timeout { .. })
    }

    /// Borrow the operation's error, if that is what this is
    pub fn as_operation(&self) -> Option<&E> {
        match self {
            CallError::Operation(e) => Some(e),
            _ => None,
        }
    }

    /// Take the operation's error, if that is what this is
    pub fn into_operation(self) -> Option<E> {
        match self {
            CallError::Operation(e) => Some(e),
            _ => None,
        }
    }

    /// Convert the operation error while keeping breaker outcomes intact
    pub fn map_operation<F>(self, f: impl FnOnce(E) -> F) -> CallError<F> {
        match self {
            CallError::CircuitOpen(e) => CallError::CircuitOpen(e),
            CallError::Timeout { component, timeout } => CallError::Timeout { component, timeout },
            CallError::Operation(e) => CallError::Operation(f(e)),
        }
    }
}

/// Fallback lookup failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FallbackError {
    /// No fallback was registered under the requested service name
    #[error("No fallback registered for service '{service}'")]
    NoFallbackRegistered { service: String },
}

/// Failures from running a feature through the degradation manager
#[derive(Debug, Error)]
pub enum FeatureError<E> {
    /// Feature has no degraded implementation and its primary path failed or was skipped
    #[error("Feature '{feature}' is unavailable")]
    Unavailable {
        feature: String,
        #[source]
        cause: Option<E>,
    },

    /// The degraded implementation itself failed
    #[error("Degraded implementation for feature '{feature}' failed: {error}")]
    Degraded {
        feature: String,
        #[source]
        error: BoxError,
    },

    /// Primary path error for a feature the manager does not track
    #[error(transparent)]
    Primary(E),
}

impl<E> FeatureError<E> {
    /// True when the feature could not be served at all
    pub fn is_unavailable(&self) -> bool {
        matches!(self, FeatureError::Unavailable { .. })
    }
}

/// Crate-level error for setup and administrative operations
#[derive(Debug, Error)]
pub enum ResilienceError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Fallback(#[from] FallbackError),

    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpenError),
}

pub type ResilienceResult<T> = Result<T, ResilienceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circuit_open_message_names_breaker() {
        let err = CircuitOpenError {
            name: "weather".to_string(),
            state: CircuitState::Open,
            remaining_cooldown: Duration::from_millis(1500),
        };

        assert_eq!(
            err.to_string(),
            "Circuit breaker 'weather' is open; retry in 1500ms"
        );
    }

    #[test]
    fn test_operation_error_passes_through() {
        let err: CallError<std::io::Error> = CallError::Operation(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "partner down",
        ));

        assert_eq!(err.to_string(), "partner down");
        assert!(!err.is_circuit_open());
        assert_eq!(
            err.into_operation().map(|e| e.kind()),
            Some(std::io::ErrorKind::ConnectionRefused)
        );
    }

    #[test]
    fn test_map_operation_keeps_timeout() {
        let err: CallError<&str> = CallError::Timeout {
            component: "maps".to_string(),
            timeout: Duration::from_secs(2),
        };

        let mapped = err.map_operation(|e| e.len());
        assert!(mapped.is_timeout());
        assert_eq!(mapped.to_string(), "Call to 'maps' timed out after 2000ms");
    }

    #[test]
    fn test_no_fallback_registered_message() {
        let err = FallbackError::NoFallbackRegistered {
            service: "lounges".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "No fallback registered for service 'lounges'"
        );
    }
}
