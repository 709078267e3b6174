mod common;

use common::{
    count, counting_source, flaky_source, inner, runs, Answer, CountingBreaker, CountingLimiter,
    CountingRetry, TestError,
};
use shapeguard::{
    CircuitBreakerTransform, Promise, RateLimiterTransform, ResilienceError, RetryTransform,
};
use std::future::IntoFuture;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[tokio::test]
async fn success_records_exactly_one_success() {
    let breaker = CountingBreaker::closed("api");
    let runs = runs();

    let out = counting_source(&runs, |_| Ok("real"))
        .transform(CircuitBreakerTransform::of(breaker.clone()))
        .await;

    assert_eq!(out.unwrap(), "real");
    assert_eq!((breaker.successes(), breaker.errors()), (1, 0));
    assert_eq!(count(&runs), 1);
}

#[tokio::test]
async fn failure_records_exactly_one_error() {
    let breaker = CountingBreaker::closed("api");
    let runs = runs();

    let out = counting_source(&runs, |_| Err(inner("down")))
        .transform(CircuitBreakerTransform::of(breaker.clone()))
        .await;

    assert!(matches!(out, Err(ResilienceError::Inner(TestError("down")))));
    assert_eq!((breaker.successes(), breaker.errors()), (0, 1));
}

#[tokio::test]
async fn completion_without_value_records_nothing() {
    let breaker = CountingBreaker::closed("api");

    let out = Promise::<&str, TestError>::new(|down| down.complete())
        .transform(CircuitBreakerTransform::of(breaker.clone()))
        .await;

    assert!(out.unwrap_err().is_incomplete());
    assert_eq!((breaker.successes(), breaker.errors()), (0, 0));
    assert_eq!(breaker.releases(), 1);
}

#[tokio::test]
async fn silently_dropped_downstream_releases_the_permit() {
    let breaker = CountingBreaker::closed("api");

    let out = Promise::<&str, TestError>::new(|down| drop(down))
        .transform(CircuitBreakerTransform::of(breaker.clone()))
        .await;

    assert!(out.unwrap_err().is_incomplete());
    assert_eq!((breaker.successes(), breaker.errors()), (0, 0));
    assert_eq!(breaker.releases(), 1);
}

#[tokio::test]
async fn recorded_outcomes_do_not_release() {
    let breaker = CountingBreaker::closed("api");

    let _ = Promise::<&str, TestError>::value("real")
        .transform(CircuitBreakerTransform::of(breaker.clone()))
        .await;
    let _ = Promise::<&str, TestError>::from_fn(|| Err(inner("down")))
        .transform(CircuitBreakerTransform::of(breaker.clone()))
        .await;

    assert_eq!((breaker.successes(), breaker.errors()), (1, 1));
    assert_eq!(breaker.releases(), 0);
}

#[tokio::test]
async fn open_breaker_never_subscribes_upstream() {
    let breaker = CountingBreaker::open("api");
    let runs = runs();

    let out = counting_source(&runs, |_| Ok("real"))
        .transform(CircuitBreakerTransform::of(breaker.clone()))
        .await;

    let err = out.unwrap_err();
    assert!(err.is_circuit_open());
    assert_eq!(err.policy_name(), Some("api"));
    assert_eq!(count(&runs), 0);
    assert_eq!((breaker.successes(), breaker.errors()), (0, 0));
}

#[tokio::test]
async fn recovery_substitutes_failures() {
    let breaker = CountingBreaker::closed("api");
    let runs = runs();

    let out = counting_source(&runs, |_| Err(inner("down")))
        .transform(CircuitBreakerTransform::of(breaker.clone()).recover(|_| Ok("fallback")))
        .await;

    assert_eq!(out.unwrap(), "fallback");
    assert_eq!(breaker.errors(), 1, "failure is recorded before recovery runs");
}

#[tokio::test]
async fn recovery_failure_surfaces_as_the_final_error() {
    let breaker = CountingBreaker::closed("api");
    let recoveries = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&recoveries);

    let out = Promise::<&str, TestError>::from_fn(|| Err(inner("down")))
        .transform(CircuitBreakerTransform::of(breaker).recover(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            Err(inner("recovery failed"))
        }))
        .await;

    assert!(matches!(out, Err(ResilienceError::Inner(TestError("recovery failed")))));
    assert_eq!(recoveries.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn retry_subscribes_exactly_max_attempts_times() {
    let retry = CountingRetry::new("flaky", 4);
    let runs = runs();

    let out = counting_source(&runs, |_| Err(inner("always")))
        .transform(RetryTransform::of(retry.clone()))
        .await;

    assert!(matches!(out, Err(ResilienceError::Inner(TestError("always")))));
    assert_eq!(count(&runs), 4);
    assert_eq!((retry.successes(), retry.errors()), (0, 4));
}

#[tokio::test]
async fn retry_exhaustion_is_recoverable() {
    let retry = CountingRetry::new("flaky", 2);
    let runs = runs();

    let out = counting_source(&runs, |_| Err(inner("always")))
        .transform(RetryTransform::of(retry).recover(|_| Ok("cached")))
        .await;

    assert_eq!(out.unwrap(), "cached");
    assert_eq!(count(&runs), 2);
}

#[tokio::test]
async fn retry_reports_denials_to_its_policy() {
    let retry = CountingRetry::new("flaky", 5);
    let breaker = CountingBreaker::open("api");
    let runs = runs();

    let out = counting_source(&runs, |_| Ok("real"))
        .transform(CircuitBreakerTransform::of(breaker.clone()))
        .transform(RetryTransform::of(retry.clone()))
        .await;

    assert!(out.unwrap_err().is_circuit_open());
    assert_eq!(breaker.permission_checks.load(Ordering::SeqCst), 5);
    assert_eq!(retry.errors(), 5);
    assert_eq!(count(&runs), 0);
}

#[tokio::test]
async fn retry_through_a_breaker_succeeds_once_it_closes() {
    let retry = CountingRetry::new("flaky", 3);
    let breaker = CountingBreaker::open("api");
    let runs = runs();
    let gate = Arc::clone(&breaker);

    let out = counting_source(&runs, |_| Ok("real"))
        .transform(CircuitBreakerTransform::of(breaker.clone()))
        .transform(RetryTransform::of(retry.clone()).recover(move |err| {
            gate.set_open(false);
            Err(err)
        }))
        .await;

    assert!(out.unwrap_err().is_circuit_open());
    assert_eq!(retry.errors(), 3);

    let again = counting_source(&runs, |_| Ok("real"))
        .transform(CircuitBreakerTransform::of(breaker.clone()))
        .transform(RetryTransform::of(retry.clone()))
        .await;
    assert_eq!(again.unwrap(), "real");
    assert_eq!(retry.successes(), 1);
}

#[tokio::test]
async fn retry_never_repeats_an_interrupted_wait() {
    let retry = CountingRetry::new("flaky", 5);
    let limiter = CountingLimiter::new("quota", Answer::Interrupt);
    let runs = runs();

    let out = counting_source(&runs, |_| Ok("real"))
        .transform(RateLimiterTransform::of(limiter.clone()))
        .transform(RetryTransform::of(retry.clone()).recover(|_| Ok("never")))
        .await;

    assert!(out.unwrap_err().is_interrupted());
    assert_eq!(limiter.requests(), 1);
    assert_eq!(retry.errors(), 0);
    assert_eq!(count(&runs), 0);
}

#[test]
fn synchronous_failures_retry_without_growing_the_stack() {
    const ATTEMPTS: usize = 10_000;
    let retry = CountingRetry::new("flaky", ATTEMPTS);
    let runs = runs();
    let promise = counting_source(&runs, |_| Err(inner("always")))
        .transform(RetryTransform::of(retry.clone()));

    let out = std::thread::Builder::new()
        .stack_size(256 * 1024)
        .spawn(move || futures::executor::block_on(promise.into_future()))
        .unwrap()
        .join()
        .unwrap();

    assert!(out.unwrap_err().is_inner());
    assert_eq!(count(&runs), ATTEMPTS);
    assert_eq!(retry.errors(), ATTEMPTS);
}

#[tokio::test]
async fn limiter_timeout_never_subscribes_and_names_the_limiter() {
    let limiter = CountingLimiter::new("quota", Answer::Exhausted);
    let runs = runs();

    let out = counting_source(&runs, |_| Ok("real"))
        .transform(RateLimiterTransform::of(limiter.clone()))
        .await;

    let err = out.unwrap_err();
    assert!(err.is_not_permitted());
    assert_eq!(err.policy_name(), Some("quota"));
    assert_eq!(count(&runs), 0);
    assert_eq!(limiter.requests(), 1);
}

#[tokio::test]
async fn limiter_denial_is_recoverable() {
    let limiter = CountingLimiter::new("quota", Answer::Exhausted);

    let out = Promise::<&str, TestError>::value("real")
        .transform(RateLimiterTransform::of(limiter).recover(|_| Ok("later")))
        .await;

    assert_eq!(out.unwrap(), "later");
}

#[tokio::test]
async fn interrupted_wait_is_fatal() {
    let limiter = CountingLimiter::new("quota", Answer::Interrupt);
    let runs = runs();

    let out = counting_source(&runs, |_| Ok("real"))
        .transform(RateLimiterTransform::of(limiter).recover(|_| Ok("never")))
        .await;

    let err = out.unwrap_err();
    assert!(err.is_interrupted());
    assert!(err.is_fatal());
    assert_eq!(count(&runs), 0);
}

#[tokio::test]
async fn granted_permit_runs_the_source() {
    let limiter = CountingLimiter::new("quota", Answer::Grant);
    let runs = runs();

    let out = flaky_source(&runs, 0, "real")
        .transform(RateLimiterTransform::of(limiter))
        .await;

    assert_eq!(out.unwrap(), "real");
    assert_eq!(count(&runs), 1);
}
