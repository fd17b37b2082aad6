//! Error types for circuit breaker operations

use std::time::Duration;
use thiserror::Error;

/// Errors returned by a guarded call
///
/// `Open` is the only error the breaker produces itself. Every failure of the
/// wrapped operation comes back as `Execution`, holding the original error
/// by value.
#[derive(Debug, Error)]
pub enum CircuitError<E> {
    /// Circuit is open, the call was rejected without running the operation
    #[error("circuit '{circuit}' is open, call rejected (retry in {retry_after:?})")]
    Open {
        circuit: String,
        /// Nominal time left before a half-open probe is admitted. Computed
        /// from the configured timeout; with jitter enabled the actual dwell
        /// can be shorter.
        retry_after: Duration,
    },
    /// The wrapped operation failed
    #[error("{0}")]
    Execution(E),
}

impl<E> CircuitError<E> {
    /// True when the call was refused by an open circuit
    pub fn is_open(&self) -> bool {
        matches!(self, CircuitError::Open { .. })
    }

    /// Borrow the operation's error, if the operation ran and failed
    pub fn execution(&self) -> Option<&E> {
        match self {
            CircuitError::Execution(e) => Some(e),
            CircuitError::Open { .. } => None,
        }
    }

    /// Take back the operation's error, if the operation ran and failed
    pub fn into_execution(self) -> Option<E> {
        match self {
            CircuitError::Execution(e) => Some(e),
            CircuitError::Open { .. } => None,
        }
    }
}

/// Invalid circuit configuration, reported at construction time
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ConfigError {
    #[error("failure_threshold must be at least 1")]
    ZeroFailureThreshold,
    #[error("success_threshold must be at least 1")]
    ZeroSuccessThreshold,
    #[error("jitter_factor must be within 0.0..=1.0, got {0}")]
    InvalidJitter(f64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Error)]
    #[error("upstream returned {0}")]
    struct UpstreamError(u16);

    #[test]
    fn test_execution_display_is_inner_display() {
        let err: CircuitError<UpstreamError> = CircuitError::Execution(UpstreamError(503));
        assert_eq!(err.to_string(), "upstream returned 503");
        assert!(!err.is_open());
        assert_eq!(err.execution(), Some(&UpstreamError(503)));
        assert_eq!(err.into_execution(), Some(UpstreamError(503)));
    }

    #[test]
    fn test_open_error_message() {
        let err: CircuitError<UpstreamError> = CircuitError::Open {
            circuit: "billing".to_string(),
            retry_after: Duration::from_millis(250),
        };

        assert!(err.is_open());
        assert!(err.execution().is_none());
        let message = err.to_string();
        assert!(message.contains("'billing' is open"), "got: {message}");
        assert!(err.into_execution().is_none());
    }

    #[test]
    fn test_config_error_messages() {
        assert_eq!(
            ConfigError::ZeroFailureThreshold.to_string(),
            "failure_threshold must be at least 1"
        );
        assert_eq!(
            ConfigError::InvalidJitter(1.5).to_string(),
            "jitter_factor must be within 0.0..=1.0, got 1.5"
        );
    }
}
