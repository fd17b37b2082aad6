//! Public view of the circuit state

use serde::{Deserialize, Serialize};
use std::fmt;

/// The three states a circuit cycles through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls pass through, consecutive failures are counted
    Closed,
    /// Calls are rejected without running the operation
    Open,
    /// Probe calls are admitted to test recovery
    HalfOpen,
}

impl CircuitState {
    /// Map a state machine state name to the public enum
    pub(crate) fn from_machine(name: &str) -> Self {
        match name {
            "Open" => CircuitState::Open,
            "HalfOpen" => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
