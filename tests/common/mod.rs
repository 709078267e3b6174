//! Counting policy stubs and sources shared by the integration tests.
#![allow(dead_code)]

use shapeguard::{
    CircuitBreaker, InstantSleeper, Promise, RateLimiter, ResilienceError, Retry, RetryDecision,
    RetryState, Sleeper, WaitInterrupted,
};
use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestError(pub &'static str);

impl fmt::Display for TestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "test error: {}", self.0)
    }
}

impl Error for TestError {}

pub fn inner(msg: &'static str) -> ResilienceError<TestError> {
    ResilienceError::Inner(TestError(msg))
}

/// Breaker whose permission is a switch, counting every hook call.
#[derive(Debug)]
pub struct CountingBreaker {
    name: String,
    permits: AtomicBool,
    pub permission_checks: AtomicUsize,
    pub successes: AtomicUsize,
    pub errors: AtomicUsize,
    pub releases: AtomicUsize,
}

impl CountingBreaker {
    pub fn closed(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            permits: AtomicBool::new(true),
            permission_checks: AtomicUsize::new(0),
            successes: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
        })
    }

    pub fn open(name: &str) -> Arc<Self> {
        let breaker = Self::closed(name);
        breaker.set_open(true);
        breaker
    }

    pub fn set_open(&self, open: bool) {
        self.permits.store(!open, Ordering::SeqCst);
    }

    pub fn successes(&self) -> usize {
        self.successes.load(Ordering::SeqCst)
    }

    pub fn errors(&self) -> usize {
        self.errors.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

impl CircuitBreaker for CountingBreaker {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_call_permitted(&self) -> bool {
        self.permission_checks.fetch_add(1, Ordering::SeqCst);
        self.permits.load(Ordering::SeqCst)
    }

    fn on_success(&self, _elapsed: Duration) {
        self.successes.fetch_add(1, Ordering::SeqCst);
    }

    fn on_error(&self, _elapsed: Duration, _error: &(dyn Error + 'static)) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }

    fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// How a [`CountingLimiter`] answers permit requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Grant,
    Exhausted,
    Interrupt,
}

#[derive(Debug)]
pub struct CountingLimiter {
    name: String,
    answer: Answer,
    pub requests: AtomicUsize,
}

impl CountingLimiter {
    pub fn new(name: &str, answer: Answer) -> Arc<Self> {
        Arc::new(Self { name: name.to_string(), answer, requests: AtomicUsize::new(0) })
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl RateLimiter for CountingLimiter {
    fn name(&self) -> &str {
        &self.name
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(5)
    }

    fn get_permission(&self, _timeout: Duration) -> Result<bool, WaitInterrupted> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        match self.answer {
            Answer::Grant => Ok(true),
            Answer::Exhausted => Ok(false),
            Answer::Interrupt => Err(WaitInterrupted),
        }
    }
}

/// Retry with a fixed attempt budget and no waits, counting state callbacks.
#[derive(Debug)]
pub struct CountingRetry {
    name: String,
    max_attempts: usize,
    pub successes: Arc<AtomicUsize>,
    pub errors: Arc<AtomicUsize>,
}

impl CountingRetry {
    pub fn new(name: &str, max_attempts: usize) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            max_attempts,
            successes: Arc::new(AtomicUsize::new(0)),
            errors: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn successes(&self) -> usize {
        self.successes.load(Ordering::SeqCst)
    }

    pub fn errors(&self) -> usize {
        self.errors.load(Ordering::SeqCst)
    }
}

struct CountingState {
    attempts: usize,
    max_attempts: usize,
    successes: Arc<AtomicUsize>,
    errors: Arc<AtomicUsize>,
}

impl RetryState for CountingState {
    fn on_success(&mut self) {
        self.successes.fetch_add(1, Ordering::SeqCst);
    }

    fn on_error(&mut self, _error: &(dyn Error + 'static)) -> RetryDecision {
        self.errors.fetch_add(1, Ordering::SeqCst);
        self.attempts += 1;
        if self.attempts < self.max_attempts {
            RetryDecision::Retry { delay: Duration::ZERO }
        } else {
            RetryDecision::GiveUp
        }
    }
}

impl Retry for CountingRetry {
    fn name(&self) -> &str {
        &self.name
    }

    fn new_state(&self) -> Box<dyn RetryState> {
        Box::new(CountingState {
            attempts: 0,
            max_attempts: self.max_attempts,
            successes: Arc::clone(&self.successes),
            errors: Arc::clone(&self.errors),
        })
    }

    fn sleeper(&self) -> Arc<dyn Sleeper> {
        Arc::new(InstantSleeper)
    }
}

/// A source that counts executions and answers with `outcome(execution_index)`.
pub fn counting_source<F>(runs: &Arc<AtomicUsize>, outcome: F) -> Promise<&'static str, TestError>
where
    F: Fn(usize) -> Result<&'static str, ResilienceError<TestError>> + Send + Sync + 'static,
{
    let runs = Arc::clone(runs);
    Promise::from_fn(move || outcome(runs.fetch_add(1, Ordering::SeqCst)))
}

/// A source failing `failures` times before yielding `value`.
pub fn flaky_source(
    runs: &Arc<AtomicUsize>,
    failures: usize,
    value: &'static str,
) -> Promise<&'static str, TestError> {
    counting_source(runs, move |n| if n < failures { Err(inner("flaky")) } else { Ok(value) })
}

pub fn runs() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

pub fn count(runs: &Arc<AtomicUsize>) -> usize {
    runs.load(Ordering::SeqCst)
}
