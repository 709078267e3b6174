//! Circuit breaker interface and a lock-free reference implementation.
//!
//! Guarded calls only ever talk to the [`CircuitBreaker`] trait: ask
//! [`is_call_permitted`](CircuitBreaker::is_call_permitted) before an attempt, then report the
//! attempt's outcome with its elapsed time. [`CircuitBreakerPolicy`] is a consecutive-failure
//! breaker with half-open probing built on atomics.

use crate::clock::{Clock, MonotonicClock};
use crate::outcome::Outcome;
use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const STATE_CLOSED: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_HALF_OPEN: u8 = 2;

/// Decision and recording surface of a named circuit breaker.
pub trait CircuitBreaker: Send + Sync + fmt::Debug {
    /// Name the breaker is registered under.
    fn name(&self) -> &str;

    /// Whether an attempt may start now.
    fn is_call_permitted(&self) -> bool;

    /// Record a successful attempt.
    fn on_success(&self, elapsed: Duration);

    /// Record a failed attempt.
    fn on_error(&self, elapsed: Duration, error: &(dyn Error + 'static));

    /// A permitted attempt ended without an outcome: it was dropped, or its source completed
    /// empty. Breakers that reserve capacity on permission give it back here.
    fn release(&self) {}

    /// Record an outcome through the matching hook.
    fn record(&self, outcome: Outcome<'_>) {
        match outcome {
            Outcome::Success { elapsed } => self.on_success(elapsed),
            Outcome::Failure { elapsed, error } => self.on_error(elapsed, error),
        }
    }
}

/// Current state of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operating mode.
    Closed,
    /// Short-circuits calls until recovery timeout elapses.
    Open,
    /// Probe mode allowing a limited number of calls to test recovery.
    HalfOpen,
}

impl CircuitState {
    fn to_u8(self) -> u8 {
        match self {
            CircuitState::Closed => STATE_CLOSED,
            CircuitState::Open => STATE_OPEN,
            CircuitState::HalfOpen => STATE_HALF_OPEN,
        }
    }

    fn from_u8(v: u8) -> Option<Self> {
        match v {
            STATE_CLOSED => Some(CircuitState::Closed),
            STATE_OPEN => Some(CircuitState::Open),
            STATE_HALF_OPEN => Some(CircuitState::HalfOpen),
            _ => None,
        }
    }
}

/// Validated configuration for the circuit breaker.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    failure_threshold: usize,
    recovery_timeout: Duration,
    half_open_max_calls: usize,
}

/// Errors produced when validating breaker configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CircuitBreakerError {
    /// Failure threshold must be > 0.
    #[error("failure_threshold must be > 0 (got {provided})")]
    InvalidFailureThreshold {
        /// Value provided by caller.
        provided: usize,
    },
    /// Recovery timeout must be > 0 unless breaker disabled.
    #[error("recovery_timeout must be > 0 unless breaker is disabled (got {0:?})")]
    InvalidRecoveryTimeout(Duration),
    /// Half-open trial limit must be > 0.
    #[error("half_open_max_calls must be > 0 (got {provided})")]
    InvalidHalfOpenLimit {
        /// Value provided by caller.
        provided: usize,
    },
}

impl CircuitBreakerConfig {
    /// Create a config with validation.
    pub fn new(
        failure_threshold: usize,
        recovery_timeout: Duration,
        half_open_max_calls: usize,
    ) -> Result<Self, CircuitBreakerError> {
        let cfg = Self { failure_threshold, recovery_timeout, half_open_max_calls };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Creates a disabled circuit breaker that never opens.
    pub fn disabled() -> Self {
        Self {
            failure_threshold: usize::MAX,
            recovery_timeout: Duration::MAX,
            half_open_max_calls: usize::MAX,
        }
    }

    /// Consecutive failures before opening from Closed.
    pub fn failure_threshold(&self) -> usize {
        self.failure_threshold
    }

    /// Duration to stay Open before Half-Open trials.
    pub fn recovery_timeout(&self) -> Duration {
        self.recovery_timeout
    }

    /// Maximum concurrent calls while Half-Open.
    pub fn half_open_max_calls(&self) -> usize {
        self.half_open_max_calls
    }

    fn validate(&self) -> Result<(), CircuitBreakerError> {
        if self.failure_threshold == 0 {
            return Err(CircuitBreakerError::InvalidFailureThreshold { provided: 0 });
        }
        if self.half_open_max_calls == 0 {
            return Err(CircuitBreakerError::InvalidHalfOpenLimit { provided: 0 });
        }
        let disabled = self.failure_threshold == usize::MAX;
        if self.recovery_timeout == Duration::ZERO && !disabled {
            return Err(CircuitBreakerError::InvalidRecoveryTimeout(self.recovery_timeout));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct BreakerState {
    state: AtomicU8,
    failure_count: AtomicUsize,
    opened_at_millis: AtomicU64,
    half_open_calls: AtomicUsize,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(CircuitState::Closed.to_u8()),
            failure_count: AtomicUsize::new(0),
            opened_at_millis: AtomicU64::new(0),
            half_open_calls: AtomicUsize::new(0),
        }
    }
}

/// Consecutive-failure circuit breaker.
///
/// Clones share the same underlying state via `Arc`, so all handles observe and affect the same
/// circuit lifecycle.
#[derive(Debug, Clone)]
pub struct CircuitBreakerPolicy {
    name: Arc<str>,
    state: Arc<BreakerState>,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
}

impl CircuitBreakerPolicy {
    /// Create a breaker with `half_open_max_calls` of 1.
    ///
    /// # Examples
    /// ```
    /// use shapeguard::{CircuitBreaker, CircuitBreakerPolicy};
    /// use std::time::Duration;
    /// let breaker = CircuitBreakerPolicy::new("api", 5, Duration::from_secs(30)).unwrap();
    /// assert!(breaker.is_call_permitted());
    /// ```
    pub fn new(
        name: impl Into<String>,
        failure_threshold: usize,
        recovery_timeout: Duration,
    ) -> Result<Self, CircuitBreakerError> {
        let config = CircuitBreakerConfig::new(failure_threshold, recovery_timeout, 1)?;
        Ok(Self::with_config(name, config))
    }

    /// Create a breaker from a validated config.
    pub fn with_config(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: Arc::from(name.into()),
            state: Arc::new(BreakerState::new()),
            config,
            clock: Arc::new(MonotonicClock::default()),
        }
    }

    /// Override the clock (useful for deterministic tests).
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Current breaker state.
    pub fn state(&self) -> CircuitState {
        CircuitState::from_u8(self.state.state.load(Ordering::Acquire))
            .unwrap_or(CircuitState::Open)
    }

    /// Consecutive failures recorded since the last success or reset.
    pub fn failure_count(&self) -> usize {
        self.state.failure_count.load(Ordering::Acquire)
    }

    /// Configuration in effect.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Force the breaker back to Closed, clearing failure counts.
    pub fn reset(&self) {
        self.state.state.store(CircuitState::Closed.to_u8(), Ordering::Release);
        self.state.failure_count.store(0, Ordering::Release);
        self.state.opened_at_millis.store(0, Ordering::Release);
        self.state.half_open_calls.store(0, Ordering::Release);
        tracing::info!(breaker = %self.name, "Circuit breaker reset → closed");
    }

    fn transition(&self, from: CircuitState, to: CircuitState) -> bool {
        self.state
            .state
            .compare_exchange(from.to_u8(), to.to_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn open_elapsed_millis(&self) -> u64 {
        let opened_at = self.state.opened_at_millis.load(Ordering::Acquire);
        self.clock.now_millis().saturating_sub(opened_at)
    }
}

impl CircuitBreaker for CircuitBreakerPolicy {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_call_permitted(&self) -> bool {
        loop {
            let Some(current) = CircuitState::from_u8(self.state.state.load(Ordering::Acquire))
            else {
                return false;
            };

            match current {
                CircuitState::Closed => return true,
                CircuitState::Open => {
                    let elapsed = self.open_elapsed_millis();
                    let timeout =
                        u64::try_from(self.config.recovery_timeout.as_millis()).unwrap_or(u64::MAX);
                    if elapsed < timeout {
                        tracing::debug!(
                            breaker = %self.name,
                            open_for = ?Duration::from_millis(elapsed),
                            "Circuit breaker rejected call"
                        );
                        return false;
                    }
                    if self.transition(CircuitState::Open, CircuitState::HalfOpen) {
                        tracing::info!(breaker = %self.name, "Circuit breaker → half-open");
                    }
                    // trial slots are claimed through the half-open branch
                }
                CircuitState::HalfOpen => {
                    let current = self.state.half_open_calls.fetch_add(1, Ordering::AcqRel);
                    if current >= self.config.half_open_max_calls {
                        self.state.half_open_calls.fetch_sub(1, Ordering::Release);
                        tracing::debug!(
                            breaker = %self.name,
                            max = self.config.half_open_max_calls,
                            "Circuit breaker: half-open trial limit reached"
                        );
                        return false;
                    }
                    tracing::debug!(
                        breaker = %self.name,
                        in_flight = current + 1,
                        max = self.config.half_open_max_calls,
                        "Circuit breaker: half-open test request"
                    );
                    return true;
                }
            }
        }
    }

    /// Any success in the closed state resets the counter to 0, so only consecutive failures
    /// trip the breaker.
    fn on_success(&self, elapsed: Duration) {
        match self.state() {
            CircuitState::HalfOpen => {
                if self.transition(CircuitState::HalfOpen, CircuitState::Closed) {
                    self.state.half_open_calls.store(0, Ordering::Release);
                    self.state.failure_count.store(0, Ordering::Release);
                    self.state.opened_at_millis.store(0, Ordering::Release);
                    tracing::info!(breaker = %self.name, ?elapsed, "Circuit breaker → closed");
                }
            }
            CircuitState::Closed => {
                self.state.failure_count.store(0, Ordering::Release);
            }
            CircuitState::Open => {}
        }
    }

    fn on_error(&self, elapsed: Duration, error: &(dyn Error + 'static)) {
        let current = self.state();
        let failures = self.state.failure_count.fetch_add(1, Ordering::AcqRel) + 1;

        match current {
            CircuitState::HalfOpen => {
                self.state.opened_at_millis.store(self.clock.now_millis(), Ordering::Release);
                if self.transition(CircuitState::HalfOpen, CircuitState::Open) {
                    self.state.half_open_calls.store(0, Ordering::Release);
                    tracing::warn!(
                        breaker = %self.name,
                        failures,
                        ?elapsed,
                        error = %error,
                        "Circuit breaker: test failed → open"
                    );
                }
            }
            CircuitState::Closed => {
                if failures < self.config.failure_threshold {
                    return;
                }
                // the open stamp must be visible before the state reads Open
                self.state.opened_at_millis.store(self.clock.now_millis(), Ordering::Release);
                if self.transition(CircuitState::Closed, CircuitState::Open) {
                    self.state.half_open_calls.store(0, Ordering::Release);
                    tracing::error!(
                        breaker = %self.name,
                        failures,
                        threshold = self.config.failure_threshold,
                        error = %error,
                        "Circuit breaker → open"
                    );
                }
            }
            CircuitState::Open => {}
        }
    }

    fn release(&self) {
        if self.state() != CircuitState::HalfOpen {
            return;
        }
        let released = self
            .state
            .half_open_calls
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok();
        if released {
            tracing::debug!(breaker = %self.name, "Circuit breaker: half-open trial released");
        }
    }
}
