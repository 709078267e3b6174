//! Retry interface and a bounded-attempts reference policy.
//!
//! Semantics:
//! - A [`Retry`] hands out one fresh [`RetryState`] per guarded call; state is never shared
//!   between concurrent calls.
//! - After each failed attempt the state decides between [`RetryDecision::Retry`] (with the
//!   wait before the next attempt) and [`RetryDecision::GiveUp`].
//! - Every failure except a fatal interruption is offered to the state. The state sees the
//!   operation's own error for `ResilienceError::Inner`, otherwise the `ResilienceError`
//!   itself, so a predicate can tell denials apart with [`Error::downcast_ref`].
//! - `max_attempts` counts total attempts (initial try + retries).
//!
//! Example
//! ```rust
//! use std::time::Duration;
//! use shapeguard::{retry_blocking, IntervalFn, InstantSleeper, ResilienceError, RetryPolicy};
//!
//! let policy = RetryPolicy::builder("flaky")
//!     .max_attempts(3)
//!     .interval(IntervalFn::fixed(Duration::from_millis(10)))
//!     .with_sleeper(InstantSleeper)
//!     .build()
//!     .unwrap();
//!
//! let mut calls = 0;
//! let result: Result<&str, ResilienceError<std::io::Error>> = retry_blocking(&policy, None, || {
//!     calls += 1;
//!     if calls < 3 {
//!         Err(ResilienceError::Inner(std::io::Error::new(std::io::ErrorKind::Other, "flaky")))
//!     } else {
//!         Ok("ok")
//!     }
//! });
//! assert_eq!(result.unwrap(), "ok");
//! assert_eq!(calls, 3);
//! ```

use crate::interval::IntervalFn;
use crate::recovery::{recover_or_propagate, Recovery};
use crate::sleeper::{Sleeper, TokioSleeper};
use crate::ResilienceError;
use std::error::Error;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Make another attempt after `delay`.
    Retry {
        /// Wait before the next attempt.
        delay: Duration,
    },
    /// Stop and surface the last failure.
    GiveUp,
}

/// Per-call retry bookkeeping.
pub trait RetryState: Send {
    /// The call eventually succeeded.
    fn on_success(&mut self);

    /// An attempt failed with `error`.
    fn on_error(&mut self, error: &(dyn Error + 'static)) -> RetryDecision;
}

/// A named retry policy.
pub trait Retry: Send + Sync + fmt::Debug {
    /// Name the policy is registered under.
    fn name(&self) -> &str;

    /// Fresh state for one guarded call.
    fn new_state(&self) -> Box<dyn RetryState>;

    /// How waits between attempts are performed.
    fn sleeper(&self) -> Arc<dyn Sleeper>;
}

type RetryPredicate = Arc<dyn Fn(&(dyn Error + 'static)) -> bool + Send + Sync>;

/// Retry policy with an attempt limit, a wait interval, and a retryable-error predicate.
#[derive(Clone)]
pub struct RetryPolicy {
    name: Arc<str>,
    max_attempts: usize,
    interval: IntervalFn,
    should_retry: RetryPredicate,
    sleeper: Arc<dyn Sleeper>,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("name", &self.name)
            .field("max_attempts", &self.max_attempts)
            .field("interval", &self.interval)
            .field("sleeper", &self.sleeper)
            .field("should_retry", &"<predicate>")
            .finish()
    }
}

impl RetryPolicy {
    /// Construct a new builder with defaults.
    pub fn builder(name: impl Into<String>) -> RetryPolicyBuilder {
        RetryPolicyBuilder::new(name)
    }

    /// Total attempts per call.
    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Wait interval between attempts.
    pub fn interval(&self) -> &IntervalFn {
        &self.interval
    }
}

impl Retry for RetryPolicy {
    fn name(&self) -> &str {
        &self.name
    }

    fn new_state(&self) -> Box<dyn RetryState> {
        Box::new(AttemptState {
            name: Arc::clone(&self.name),
            max_attempts: self.max_attempts,
            interval: self.interval.clone(),
            should_retry: Arc::clone(&self.should_retry),
            failures: 0,
        })
    }

    fn sleeper(&self) -> Arc<dyn Sleeper> {
        Arc::clone(&self.sleeper)
    }
}

struct AttemptState {
    name: Arc<str>,
    max_attempts: usize,
    interval: IntervalFn,
    should_retry: RetryPredicate,
    failures: usize,
}

impl RetryState for AttemptState {
    fn on_success(&mut self) {
        if self.failures > 0 {
            tracing::debug!(
                retry = %self.name,
                attempt = self.failures + 1,
                "Retry succeeded"
            );
        }
    }

    fn on_error(&mut self, error: &(dyn Error + 'static)) -> RetryDecision {
        self.failures += 1;

        if !(self.should_retry)(error) {
            tracing::debug!(retry = %self.name, error = %error, "Error not retryable");
            return RetryDecision::GiveUp;
        }

        if self.failures >= self.max_attempts {
            tracing::warn!(
                retry = %self.name,
                attempts = self.failures,
                error = %error,
                "Retry attempts exhausted"
            );
            return RetryDecision::GiveUp;
        }

        // 1-indexed: the wait after the first failure is delay(1)
        let delay = self.interval.delay(self.failures);
        tracing::debug!(
            retry = %self.name,
            attempt = self.failures,
            ?delay,
            error = %error,
            "Retrying after failure"
        );
        RetryDecision::Retry { delay }
    }
}

/// Builder for `RetryPolicy`.
pub struct RetryPolicyBuilder {
    name: String,
    max_attempts: usize,
    interval: IntervalFn,
    should_retry: RetryPredicate,
    sleeper: Arc<dyn Sleeper>,
}

/// Errors produced while building a retry policy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    /// `max_attempts` must be > 0.
    #[error("max_attempts must be > 0 (got {0})")]
    InvalidMaxAttempts(usize),
}

impl RetryPolicyBuilder {
    /// Create a builder: 3 attempts, 500ms fixed wait, every error retryable.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_attempts: 3,
            interval: IntervalFn::default(),
            should_retry: Arc::new(|_| true),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Set total attempts (initial + retries). Must be > 0.
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set the wait interval between attempts.
    pub fn interval(mut self, interval: IntervalFn) -> Self {
        self.interval = interval;
        self
    }

    /// Predicate to decide if an error is retryable.
    ///
    /// Use [`Error::downcast_ref`] to inspect concrete types.
    pub fn should_retry<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&(dyn Error + 'static)) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Arc::new(predicate);
        self
    }

    /// Provide a custom sleeper implementation.
    pub fn with_sleeper<S>(mut self, sleeper: S) -> Self
    where
        S: Sleeper + 'static,
    {
        self.sleeper = Arc::new(sleeper);
        self
    }

    /// Build the retry policy, validating inputs.
    pub fn build(self) -> Result<RetryPolicy, BuildError> {
        if self.max_attempts == 0 {
            return Err(BuildError::InvalidMaxAttempts(0));
        }
        Ok(RetryPolicy {
            name: Arc::from(self.name),
            max_attempts: self.max_attempts,
            interval: self.interval,
            should_retry: self.should_retry,
            sleeper: self.sleeper,
        })
    }
}

/// Run a synchronous call under `retry`, blocking between attempts.
///
/// Exhaustion (or a non-retryable failure) is handed to `recovery` when one is set.
pub fn retry_blocking<T, E, F>(
    retry: &dyn Retry,
    recovery: Option<&Recovery<T, E>>,
    mut call: F,
) -> Result<T, ResilienceError<E>>
where
    E: Error + Send + Sync + 'static,
    F: FnMut() -> Result<T, ResilienceError<E>>,
{
    let mut state = retry.new_state();
    let sleeper = retry.sleeper();
    loop {
        match call() {
            Ok(value) => {
                state.on_success();
                return Ok(value);
            }
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => match state.on_error(err.as_hook_error()) {
                RetryDecision::Retry { delay } => {
                    if !delay.is_zero() {
                        sleeper.block(delay);
                    }
                }
                RetryDecision::GiveUp => return recover_or_propagate(recovery, err),
            },
        }
    }
}

/// Run an async call under `retry`, invoking `factory` once per attempt.
pub async fn retry_async<T, E, F, Fut>(
    retry: Arc<dyn Retry>,
    recovery: Option<Recovery<T, E>>,
    mut factory: F,
) -> Result<T, ResilienceError<E>>
where
    E: Error + Send + Sync + 'static,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ResilienceError<E>>>,
{
    let mut state = retry.new_state();
    let sleeper = retry.sleeper();
    loop {
        let delay = match factory().await {
            Ok(value) => {
                state.on_success();
                return Ok(value);
            }
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => match state.on_error(err.as_hook_error()) {
                RetryDecision::Retry { delay } => delay,
                RetryDecision::GiveUp => return recover_or_propagate(recovery.as_ref(), err),
            },
        };
        if !delay.is_zero() {
            sleeper.sleep(delay).await;
        }
    }
}
