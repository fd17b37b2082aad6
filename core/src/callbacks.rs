//! Callback system for circuit breaker state transitions

use crate::state::CircuitState;
use std::sync::Arc;

/// Hook invoked with the circuit name
pub type TransitionHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Callbacks for circuit breaker events
#[derive(Clone, Default)]
pub struct Callbacks {
    pub on_open: Option<TransitionHook>,
    pub on_close: Option<TransitionHook>,
    pub on_half_open: Option<TransitionHook>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the hook registered for entering `state`
    pub fn trigger(&self, state: CircuitState, circuit: &str) {
        let hook = match state {
            CircuitState::Open => &self.on_open,
            CircuitState::Closed => &self.on_close,
            CircuitState::HalfOpen => &self.on_half_open,
        };
        if let Some(callback) = hook {
            callback(circuit);
        }
    }
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_open", &self.on_open.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("on_half_open", &self.on_half_open.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_trigger_routes_to_matching_hook() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (open_log, close_log) = (seen.clone(), seen.clone());

        let callbacks = Callbacks {
            on_open: Some(Arc::new(move |name: &str| {
                open_log.lock().unwrap().push(format!("open:{name}"))
            })),
            on_close: Some(Arc::new(move |name: &str| {
                close_log.lock().unwrap().push(format!("close:{name}"))
            })),
            on_half_open: None,
        };

        callbacks.trigger(CircuitState::Open, "db");
        callbacks.trigger(CircuitState::HalfOpen, "db");
        callbacks.trigger(CircuitState::Closed, "db");

        assert_eq!(*seen.lock().unwrap(), vec!["open:db", "close:db"]);
    }
}
