//! Circuit breaker implementation using state machines
//!
//! All mutable state of a breaker sits behind one mutex. A call takes the
//! lock to be admitted and again to record its outcome; the lock is never
//! held while the wrapped operation runs.

use crate::{
    callbacks::Callbacks,
    errors::{CircuitError, ConfigError},
    state::CircuitState,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use state_machines::state_machine;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

/// Circuit breaker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Consecutive failures in Closed that open the circuit
    pub failure_threshold: usize,

    /// Consecutive successes in HalfOpen that close the circuit
    pub success_threshold: usize,

    /// Minimum time spent Open, measured from the last failure, before a
    /// probe call is admitted
    pub timeout: Duration,

    /// Jitter factor for timeout (0.0 = no jitter, 1.0 = full jitter)
    /// Uses chrono-machines formula: timeout * (1 - jitter + rand * jitter)
    pub jitter_factor: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout: Duration::from_secs(30),
            jitter_factor: 0.0,
        }
    }
}

impl Config {
    /// Reject configurations the state machine cannot honour
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::ZeroFailureThreshold);
        }
        if self.success_threshold == 0 {
            return Err(ConfigError::ZeroSuccessThreshold);
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(ConfigError::InvalidJitter(self.jitter_factor));
        }
        Ok(())
    }

    /// Open dwell time for one admission check, jittered when configured
    fn effective_timeout(&self) -> Duration {
        let base_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
        // Sub-millisecond timeouts are below the jitter policy's resolution
        if self.jitter_factor > 0.0 && base_ms > 0 {
            let policy = chrono_machines::Policy {
                max_attempts: 1,
                base_delay_ms: base_ms,
                multiplier: 1.0,
                max_delay_ms: base_ms,
            };
            Duration::from_millis(policy.calculate_delay(1, self.jitter_factor))
        } else {
            self.timeout
        }
    }
}

/// Consecutive-failure counter shared with the state machine guards
///
/// Mutated only while the breaker lock is held.
#[derive(Debug, Default)]
pub struct FailureTally(AtomicUsize);

impl FailureTally {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }

    fn set(&self, count: usize) {
        self.0.store(count, Ordering::Relaxed);
    }

    fn increment(&self) -> usize {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Circuit breaker context - shared data across all states
#[derive(Debug, Clone, Default)]
pub struct CircuitContext {
    pub name: String,
    pub config: Config,
    /// Consecutive failures while Closed; the count the circuit opened with
    /// while Open or HalfOpen
    pub failures: Arc<FailureTally>,
}

impl CircuitContext {
    pub fn new(name: impl Into<String>, config: Config) -> Self {
        Self {
            name: name.into(),
            config,
            failures: Arc::default(),
        }
    }
}

/// Data specific to the Open state
#[derive(Debug, Clone, Default)]
pub struct OpenData {
    /// Start of the dwell time: the failure that opened the circuit, or a
    /// later failure from a call admitted before it opened
    pub opened_at: Option<Instant>,
}

/// Data specific to the HalfOpen state
#[derive(Debug, Clone, Default)]
pub struct HalfOpenData {
    pub consecutive_successes: usize,
}

// Define the circuit breaker state machine with dynamic mode
state_machine! {
    name: Circuit,
    context: CircuitContext,
    dynamic: true,  // Enable dynamic mode for runtime state transitions

    initial: Closed,
    states: [
        Closed,
        Open(OpenData),
        HalfOpen(HalfOpenData),
    ],
    events {
        trip {
            guards: [should_open],
            transition: { from: [Closed, HalfOpen], to: Open }
        }
        attempt_reset {
            guards: [timeout_elapsed],
            transition: { from: Open, to: HalfOpen }
        }
        close {
            guards: [should_close],
            transition: { from: HalfOpen, to: Closed }
        }
    }
}

impl Circuit<Closed> {
    /// Check if the consecutive failure count reached the threshold
    fn should_open(&self, ctx: &CircuitContext) -> bool {
        ctx.failures.get() >= ctx.config.failure_threshold
    }
}

impl Circuit<HalfOpen> {
    /// A single failed probe reopens the circuit
    fn should_open(&self, _ctx: &CircuitContext) -> bool {
        true
    }

    /// Check if enough successes to close circuit
    fn should_close(&self, ctx: &CircuitContext) -> bool {
        let data = self
            .state_data_half_open()
            .expect("HalfOpen state must have data");
        data.consecutive_successes >= ctx.config.success_threshold
    }
}

impl Circuit<Open> {
    /// Check if timeout has elapsed for Open -> HalfOpen transition
    fn timeout_elapsed(&self, ctx: &CircuitContext) -> bool {
        let data = self.state_data_open().expect("Open state must have data");
        data.opened_at
            .is_some_and(|at| at.elapsed() >= ctx.config.effective_timeout())
    }
}

/// Everything guarded by the breaker lock
struct Inner {
    machine: DynamicCircuit,
    last_failure_at: Option<Instant>,
}

impl Inner {
    fn new(context: &CircuitContext) -> Self {
        Self {
            machine: DynamicCircuit::new(context.clone()),
            last_failure_at: None,
        }
    }

    fn state(&self) -> CircuitState {
        CircuitState::from_machine(self.machine.current_state())
    }

    /// Move Open -> HalfOpen when the dwell time is over
    fn attempt_half_open(&mut self) -> bool {
        self.state() == CircuitState::Open
            && self.machine.handle(CircuitEvent::AttemptReset).is_ok()
    }

    /// Fire the trip event and start the dwell time
    fn trip(&mut self, now: Instant) -> bool {
        if self.machine.handle(CircuitEvent::Trip).is_err() {
            return false;
        }
        self.restart_dwell(now);
        true
    }

    fn restart_dwell(&mut self, now: Instant) {
        match self.machine.open_data_mut() {
            Some(data) => data.opened_at = Some(now),
            None => debug_assert!(false, "Open state must have data"),
        }
    }

    fn success_count(&self) -> usize {
        if self.state() != CircuitState::HalfOpen {
            return 0;
        }
        match self.machine.half_open_data() {
            Some(data) => data.consecutive_successes,
            None => {
                debug_assert!(false, "HalfOpen state must have data");
                0
            }
        }
    }
}

/// Counters of whichever state is current
#[derive(Debug, Clone, Copy)]
struct Reading {
    state: CircuitState,
    failure_count: usize,
    success_count: usize,
    last_failure_at: Option<Instant>,
}

/// Point-in-time view of a circuit, suitable for logs and status endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircuitSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: usize,
    pub success_count: usize,
    pub failure_threshold: usize,
    pub success_threshold: usize,
    pub timeout_ms: u64,
}

/// Circuit breaker public API
///
/// Shared between call sites behind an `Arc`; every method takes `&self`.
pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    context: CircuitContext,
    callbacks: Callbacks,
}

impl CircuitBreaker {
    /// Create a new circuit breaker (use builder() for callbacks)
    pub fn new(name: impl Into<String>, config: Config) -> Result<Self, ConfigError> {
        Self::with_context_and_callbacks(CircuitContext::new(name, config), Callbacks::new())
    }

    /// Create a circuit breaker with custom context and callbacks (used by builder)
    pub(crate) fn with_context_and_callbacks(
        context: CircuitContext,
        callbacks: Callbacks,
    ) -> Result<Self, ConfigError> {
        context.config.validate()?;
        let inner = Inner::new(&context);

        Ok(Self {
            inner: Mutex::new(inner),
            context,
            callbacks,
        })
    }

    /// Create a new circuit breaker builder
    pub fn builder(name: impl Into<String>) -> crate::builder::CircuitBuilder {
        crate::builder::CircuitBuilder::new(name)
    }

    /// Execute a fallible operation with circuit breaker protection
    ///
    /// The operation runs at most once. Its value is returned untouched and
    /// its error comes back as [`CircuitError::Execution`]. When the circuit
    /// is open the operation is not run and [`CircuitError::Open`] is returned.
    pub fn call<T, E, F>(&self, f: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        self.admit()?;
        self.settle(f())
    }

    /// Async variant of [`call`](Self::call)
    ///
    /// The breaker does not time out or cancel the future; dropping the
    /// returned future before completion records no outcome.
    pub async fn call_async<T, E, F, Fut>(&self, f: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.admit()?;
        let outcome = f().await;
        self.settle(outcome)
    }

    /// Transition check plus admission gate, under one lock
    fn admit<E>(&self) -> Result<(), CircuitError<E>> {
        let (half_opened, rejection) = {
            let mut inner = self.inner.lock();
            let half_opened = inner.attempt_half_open();
            let rejection =
                (inner.state() == CircuitState::Open).then(|| self.retry_after(&inner));
            (half_opened, rejection)
        };

        if half_opened {
            self.announce(CircuitState::HalfOpen);
        }

        match rejection {
            Some(retry_after) => {
                trace!(circuit = %self.context.name, ?retry_after, "call rejected, circuit open");
                Err(CircuitError::Open {
                    circuit: self.context.name.clone(),
                    retry_after,
                })
            }
            None => Ok(()),
        }
    }

    fn settle<T, E>(&self, outcome: Result<T, E>) -> Result<T, CircuitError<E>> {
        match outcome {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(e) => {
                self.record_failure();
                Err(CircuitError::Execution(e))
            }
        }
    }

    /// Record a successful operation and drive HalfOpen -> Closed transitions
    ///
    /// `call` and `call_async` do this on their own; use it directly only for
    /// operations executed outside the breaker.
    pub fn record_success(&self) {
        let failures = &self.context.failures;
        let closed = {
            let mut inner = self.inner.lock();
            match inner.state() {
                CircuitState::Closed => {
                    failures.set(0);
                    false
                }
                CircuitState::HalfOpen => {
                    match inner.machine.half_open_data_mut() {
                        Some(data) => data.consecutive_successes += 1,
                        None => debug_assert!(false, "HalfOpen state must have data"),
                    }
                    let closed = inner.machine.handle(CircuitEvent::Close).is_ok();
                    if closed {
                        failures.set(0);
                        inner.last_failure_at = None;
                    }
                    closed
                }
                // Late success from a call admitted before the circuit opened
                CircuitState::Open => false,
            }
        };

        if closed {
            self.announce(CircuitState::Closed);
        }
    }

    /// Record a failed operation and attempt to trip the circuit
    pub fn record_failure(&self) {
        let now = Instant::now();
        let failures = &self.context.failures;
        let opened = {
            let mut inner = self.inner.lock();
            inner.last_failure_at = Some(now);
            match inner.state() {
                CircuitState::Closed => {
                    failures.increment();
                    inner.trip(now)
                }
                CircuitState::HalfOpen => {
                    failures.set(self.context.config.failure_threshold);
                    inner.trip(now)
                }
                CircuitState::Open => {
                    // Late failure: restart the dwell time, keep the count
                    inner.restart_dwell(now);
                    false
                }
            }
        };

        if opened {
            self.announce(CircuitState::Open);
        }
    }

    /// Nominal time left in the Open state, ignoring jitter
    fn retry_after(&self, inner: &Inner) -> Duration {
        let timeout = self.context.config.timeout;
        inner
            .machine
            .open_data()
            .and_then(|data| data.opened_at)
            .map(|at| timeout.saturating_sub(at.elapsed()))
            .unwrap_or(timeout)
    }

    /// Log a transition and run its callback, outside the lock
    fn announce(&self, state: CircuitState) {
        let name = &self.context.name;
        let config = &self.context.config;
        match state {
            CircuitState::Open => info!(
                circuit = %name,
                failure_threshold = config.failure_threshold,
                timeout = ?config.timeout,
                "circuit opened"
            ),
            CircuitState::HalfOpen => debug!(circuit = %name, "circuit half-open, admitting probes"),
            CircuitState::Closed => info!(
                circuit = %name,
                success_threshold = config.success_threshold,
                "circuit closed"
            ),
        }
        self.callbacks.trigger(state, name);
    }

    /// Force the circuit back to its initial Closed state
    pub fn reset(&self) {
        {
            let mut inner = self.inner.lock();
            *inner = Inner::new(&self.context);
            self.context.failures.set(0);
        }
        debug!(circuit = %self.context.name, "circuit reset");
    }

    fn read(&self) -> Reading {
        let inner = self.inner.lock();
        Reading {
            state: inner.state(),
            failure_count: self.context.failures.get(),
            success_count: inner.success_count(),
            last_failure_at: inner.last_failure_at,
        }
    }

    /// Circuit name
    pub fn name(&self) -> &str {
        &self.context.name
    }

    /// Current state
    ///
    /// Reading the state never moves an Open circuit to HalfOpen; only the
    /// next call does.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state()
    }

    /// Get current state name
    pub fn state_name(&self) -> &'static str {
        self.state().as_str()
    }

    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    pub fn is_closed(&self) -> bool {
        self.state() == CircuitState::Closed
    }

    pub fn is_half_open(&self) -> bool {
        self.state() == CircuitState::HalfOpen
    }

    /// Consecutive failures while Closed; the count the circuit opened with
    /// while Open or HalfOpen
    pub fn failure_count(&self) -> usize {
        self.read().failure_count
    }

    /// Consecutive successes while HalfOpen, zero otherwise
    pub fn success_count(&self) -> usize {
        self.read().success_count
    }

    /// When the last recorded failure happened, cleared on closing and reset
    pub fn last_failure_at(&self) -> Option<Instant> {
        self.read().last_failure_at
    }

    pub fn failure_threshold(&self) -> usize {
        self.context.config.failure_threshold
    }

    pub fn success_threshold(&self) -> usize {
        self.context.config.success_threshold
    }

    pub fn timeout(&self) -> Duration {
        self.context.config.timeout
    }

    pub fn config(&self) -> &Config {
        &self.context.config
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let reading = self.read();
        CircuitSnapshot {
            name: self.context.name.clone(),
            state: reading.state,
            failure_count: reading.failure_count,
            success_count: reading.success_count,
            failure_threshold: self.context.config.failure_threshold,
            success_threshold: self.context.config.success_threshold,
            timeout_ms: u64::try_from(self.context.config.timeout.as_millis())
                .unwrap_or(u64::MAX),
        }
    }
}

impl fmt::Display for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reading = self.read();
        write!(
            f,
            "CircuitBreaker(name={}, state={}, failures={}/{}, successes={}/{}, timeout={:?})",
            self.context.name,
            reading.state,
            reading.failure_count,
            self.context.config.failure_threshold,
            reading.success_count,
            self.context.config.success_threshold,
            self.context.config.timeout,
        )
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reading = self.read();
        f.debug_struct("CircuitBreaker")
            .field("context", &self.context)
            .field("state", &reading.state)
            .field("failure_count", &reading.failure_count)
            .field("success_count", &reading.success_count)
            .field("callbacks", &self.callbacks)
            .finish()
    }
}
