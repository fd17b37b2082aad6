//! circuit-guard - Thread-safe circuit breaker
//!
//! This crate provides a circuit breaker for a single protected call site:
//! - State machine for the circuit lifecycle (Closed → Open → HalfOpen → Closed)
//! - Consecutive-failure threshold to open, consecutive-success threshold to close
//! - Lazy Open → HalfOpen transition, evaluated on the next call (no timers)
//! - One lock per breaker, never held while the protected operation runs
//! - Sync and async entry points sharing the same state
//!
//! # Example
//!
//! ```rust
//! use circuit_guard::{CircuitBreaker, CircuitError};
//! use std::time::Duration;
//!
//! let circuit = CircuitBreaker::builder("my_service")
//!     .failure_threshold(5)
//!     .timeout(Duration::from_secs(30))
//!     .success_threshold(2)
//!     .on_open(|name| println!("Circuit {} opened!", name))
//!     .build()
//!     .expect("valid configuration");
//!
//! // Execute with circuit protection
//! match circuit.call(|| Ok::<_, String>("success")) {
//!     Ok(value) => assert_eq!(value, "success"),
//!     Err(CircuitError::Open { .. }) => println!("Circuit is open, serve a fallback"),
//!     Err(CircuitError::Execution(e)) => println!("Service failed: {}", e),
//! }
//!
//! assert!(circuit.is_closed());
//! ```

pub mod builder;
pub mod callbacks;
pub mod circuit;
pub mod errors;
pub mod state;

pub use builder::CircuitBuilder;
pub use circuit::{CircuitBreaker, CircuitSnapshot, Config};
pub use errors::{CircuitError, ConfigError};
pub use state::CircuitState;
