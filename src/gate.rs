//! Permit-then-record gating shared by the breaker and limiter strategies.

use crate::circuit_breaker::CircuitBreaker;
use crate::outcome::{Outcome, StopWatch};
use crate::rate_limiter::{RateLimiter, WaitInterrupted};
use crate::recovery::{recover_or_propagate, Recovery};
use crate::ResilienceError;
use std::error::Error;
use std::sync::Arc;

/// A policy that admits or denies each attempt up front.
#[derive(Clone, Debug)]
pub(crate) enum Gate {
    Breaker(Arc<dyn CircuitBreaker>),
    Limiter(Arc<dyn RateLimiter>),
}

impl Gate {
    /// Ask for permission to start one attempt.
    ///
    /// Limiters may block the calling thread for up to their timeout. The returned
    /// [`Admission`] records the attempt's outcome, or gives the permit back if dropped first.
    pub(crate) fn admit<E>(&self) -> Result<Admission, ResilienceError<E>> {
        match self {
            Gate::Breaker(breaker) => {
                if breaker.is_call_permitted() {
                    Ok(Admission::new(self.clone()))
                } else {
                    tracing::debug!(breaker = %breaker.name(), "Call not permitted by circuit breaker");
                    Err(ResilienceError::CircuitOpen { name: breaker.name().to_string() })
                }
            }
            Gate::Limiter(limiter) => match limiter.get_permission(limiter.timeout()) {
                Ok(true) => Ok(Admission::new(self.clone())),
                Ok(false) => {
                    tracing::debug!(
                        limiter = %limiter.name(),
                        timeout = ?limiter.timeout(),
                        "Request not permitted by rate limiter"
                    );
                    Err(ResilienceError::RequestNotPermitted { name: limiter.name().to_string() })
                }
                Err(WaitInterrupted) => {
                    tracing::warn!(limiter = %limiter.name(), "Rate limiter wait interrupted");
                    Err(ResilienceError::Interrupted { name: limiter.name().to_string() })
                }
            },
        }
    }

    /// Report an attempt's outcome. Limiters keep no outcome accounting.
    fn record(&self, outcome: Outcome<'_>) {
        if let Gate::Breaker(breaker) = self {
            breaker.record(outcome);
        }
    }

    /// A permitted attempt ended without an outcome. Spent limiter permits are not refunded.
    fn release(&self) {
        if let Gate::Breaker(breaker) = self {
            breaker.release();
        }
    }

    /// Decorate-and-recover for a synchronous call: the call never runs when denied.
    pub(crate) fn run<T, E, F>(
        &self,
        recovery: Option<&Recovery<T, E>>,
        call: F,
    ) -> Result<T, ResilienceError<E>>
    where
        E: Error + 'static,
        F: FnOnce() -> Result<T, ResilienceError<E>>,
    {
        let mut admission = match self.admit() {
            Ok(admission) => admission,
            Err(denied) => return recover_or_propagate(recovery, denied),
        };
        match call() {
            Ok(value) => {
                admission.succeed();
                Ok(value)
            }
            Err(err) => {
                admission.fail(&err);
                recover_or_propagate(recovery, err)
            }
        }
    }
}

/// One permitted attempt.
///
/// Records at most one outcome. Dropping it with nothing recorded releases the permit, so a
/// cancelled or empty attempt never holds a half-open slot.
#[derive(Debug)]
pub(crate) struct Admission {
    gate: Gate,
    watch: StopWatch,
    settled: bool,
}

impl Admission {
    fn new(gate: Gate) -> Self {
        Self { gate, watch: StopWatch::start(), settled: false }
    }

    fn settle(&mut self) -> bool {
        !std::mem::replace(&mut self.settled, true)
    }

    pub(crate) fn succeed(&mut self) {
        if self.settle() {
            self.gate.record(Outcome::Success { elapsed: self.watch.elapsed() });
        }
    }

    /// The breaker sees the operation's own error when there is one.
    pub(crate) fn fail<E>(&mut self, err: &ResilienceError<E>)
    where
        E: Error + 'static,
    {
        if self.settle() {
            let elapsed = self.watch.elapsed();
            self.gate.record(Outcome::Failure { elapsed, error: err.as_hook_error() });
        }
    }
}

impl Drop for Admission {
    fn drop(&mut self) {
        if !self.settled {
            self.gate.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::{CircuitBreakerPolicy, CircuitState};
    use crate::clock::ManualClock;
    use crate::rate_limiter::{RateLimiterConfig, RateLimiterPolicy};
    use std::fmt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug)]
    struct TestError;

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test error")
        }
    }

    impl Error for TestError {}

    #[test]
    fn open_breaker_never_runs_the_call() {
        let breaker = CircuitBreakerPolicy::new("api", 1, Duration::from_secs(60)).unwrap();
        breaker.on_error(Duration::ZERO, &TestError);
        let gate = Gate::Breaker(Arc::new(breaker));

        let runs = AtomicUsize::new(0);
        let out: Result<u32, ResilienceError<TestError>> = gate.run(None, || {
            runs.fetch_add(1, Ordering::SeqCst);
            Ok(1)
        });

        assert!(out.unwrap_err().is_circuit_open());
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn failures_are_recorded_then_recovered() {
        let breaker = CircuitBreakerPolicy::new("api", 1, Duration::from_secs(60)).unwrap();
        let gate = Gate::Breaker(Arc::new(breaker.clone()));
        let recovery = Recovery::value(5);

        let out = gate.run(Some(&recovery), || Err(ResilienceError::Inner(TestError)));

        assert_eq!(out.unwrap(), 5);
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn exhausted_limiter_names_itself() {
        let config = RateLimiterConfig::new(1, Duration::from_secs(60), Duration::ZERO).unwrap();
        let limiter = RateLimiterPolicy::new("quota", config).with_clock(ManualClock::new());
        let gate = Gate::Limiter(Arc::new(limiter));

        assert!(gate.admit::<TestError>().is_ok());
        let denied = gate.admit::<TestError>().unwrap_err();
        assert!(denied.is_not_permitted());
        assert_eq!(denied.policy_name(), Some("quota"));
    }

    fn half_open(clock: &ManualClock) -> CircuitBreakerPolicy {
        let breaker = CircuitBreakerPolicy::new("api", 1, Duration::from_secs(1))
            .unwrap()
            .with_clock(clock.clone());
        breaker.on_error(Duration::ZERO, &TestError);
        clock.advance(1_000);
        breaker
    }

    #[test]
    fn dropped_admission_frees_the_half_open_slot() {
        let clock = ManualClock::new();
        let breaker = half_open(&clock);
        let gate = Gate::Breaker(Arc::new(breaker.clone()));

        let admission = gate.admit::<TestError>().unwrap();
        assert!(gate.admit::<TestError>().is_err());
        drop(admission);

        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(gate.admit::<TestError>().is_ok());
    }

    #[test]
    fn admission_records_only_the_first_outcome() {
        let clock = ManualClock::new();
        let breaker = half_open(&clock);
        let gate = Gate::Breaker(Arc::new(breaker.clone()));

        let mut admission = gate.admit::<TestError>().unwrap();
        admission.succeed();
        admission.fail(&ResilienceError::Inner(TestError));
        drop(admission);

        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);
    }
}
