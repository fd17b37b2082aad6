//! Builder API for ergonomic circuit breaker configuration

use crate::{
    callbacks::Callbacks,
    circuit::{CircuitBreaker, CircuitContext, Config},
    errors::ConfigError,
};
use std::sync::Arc;
use std::time::Duration;

/// Builder for creating circuit breakers with fluent API
pub struct CircuitBuilder {
    name: String,
    config: Config,
    callbacks: Callbacks,
}

impl CircuitBuilder {
    /// Create a new builder for a circuit with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: Config::default(),
            callbacks: Callbacks::new(),
        }
    }

    /// Replace the whole configuration, e.g. one loaded from a file
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Set the failure threshold (consecutive failures to open circuit)
    pub fn failure_threshold(mut self, threshold: usize) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    /// Set the success threshold (successes needed to close from half-open)
    pub fn success_threshold(mut self, threshold: usize) -> Self {
        self.config.success_threshold = threshold;
        self
    }

    /// Set how long the circuit stays open before admitting a probe
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the open timeout in seconds
    pub fn timeout_secs(self, seconds: f64) -> Self {
        self.timeout(Duration::try_from_secs_f64(seconds.max(0.0)).unwrap_or(Duration::MAX))
    }

    /// Set the jitter factor (0.0 = no jitter, 1.0 = full jitter)
    /// Uses chrono-machines formula: timeout * (1 - jitter + rand * jitter)
    pub fn jitter_factor(mut self, factor: f64) -> Self {
        self.config.jitter_factor = factor;
        self
    }

    /// Set callback for when circuit opens
    pub fn on_open<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_open = Some(Arc::new(f));
        self
    }

    /// Set callback for when circuit closes
    pub fn on_close<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_close = Some(Arc::new(f));
        self
    }

    /// Set callback for when circuit enters half-open
    pub fn on_half_open<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_half_open = Some(Arc::new(f));
        self
    }

    /// Build the circuit breaker
    ///
    /// Fails when a threshold is zero or the jitter factor is out of range.
    pub fn build(self) -> Result<CircuitBreaker, ConfigError> {
        let context = CircuitContext::new(self.name, self.config);
        CircuitBreaker::with_context_and_callbacks(context, self.callbacks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let circuit = CircuitBuilder::new("test").build().unwrap();

        assert_eq!(circuit.state_name(), "closed");
        assert!(circuit.is_closed());
        assert_eq!(circuit.config(), &Config::default());
    }

    #[test]
    fn test_builder_custom_config() {
        let circuit = CircuitBuilder::new("inventory")
            .failure_threshold(10)
            .timeout_secs(1.5)
            .success_threshold(3)
            .build()
            .unwrap();

        assert_eq!(circuit.name(), "inventory");
        assert_eq!(circuit.failure_threshold(), 10);
        assert_eq!(circuit.success_threshold(), 3);
        assert_eq!(circuit.timeout(), Duration::from_millis(1500));
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        assert_eq!(
            CircuitBuilder::new("test")
                .failure_threshold(0)
                .build()
                .unwrap_err(),
            ConfigError::ZeroFailureThreshold
        );
        assert_eq!(
            CircuitBuilder::new("test")
                .success_threshold(0)
                .build()
                .unwrap_err(),
            ConfigError::ZeroSuccessThreshold
        );
        assert_eq!(
            CircuitBuilder::new("test")
                .jitter_factor(2.0)
                .build()
                .unwrap_err(),
            ConfigError::InvalidJitter(2.0)
        );
    }

    #[test]
    fn test_builder_with_whole_config() {
        let config = Config {
            failure_threshold: 4,
            success_threshold: 1,
            timeout: Duration::from_millis(50),
            jitter_factor: 0.5,
        };

        let circuit = CircuitBuilder::new("test").config(config.clone()).build().unwrap();
        assert_eq!(circuit.config(), &config);
    }

    #[test]
    fn test_builder_with_callbacks() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let opened = Arc::new(AtomicBool::new(false));
        let opened_clone = opened.clone();

        let circuit = CircuitBuilder::new("test")
            .failure_threshold(2)
            .on_open(move |_name| {
                opened_clone.store(true, Ordering::SeqCst);
            })
            .build()
            .unwrap();

        // Trigger failures to open circuit
        let _ = circuit.call(|| Err::<(), _>("error 1"));
        let _ = circuit.call(|| Err::<(), _>("error 2"));

        // Callback should have been triggered
        assert!(opened.load(Ordering::SeqCst));
    }
}
