//! One-call helpers for guarding a [`Promise`].
//!
//! ```
//! use shapeguard::{facade, CircuitBreakerPolicy, Promise};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let breaker = Arc::new(CircuitBreakerPolicy::new("api", 5, Duration::from_secs(30)).unwrap());
//! let source = Promise::<_, std::io::Error>::value("real");
//! let guarded = facade::breaker_recover(source, breaker, |_| Ok("fallback"));
//! assert_eq!(guarded.await.unwrap(), "real");
//! # });
//! ```

use crate::circuit_breaker::CircuitBreaker;
use crate::promise::Promise;
use crate::rate_limiter::RateLimiter;
use crate::retry::Retry;
use crate::transform::{CircuitBreakerTransform, RateLimiterTransform, RetryTransform};
use crate::ResilienceError;
use std::error::Error;
use std::sync::Arc;

/// Guard `source` with `breaker`.
pub fn breaker<T, E>(source: Promise<T, E>, breaker: Arc<dyn CircuitBreaker>) -> Promise<T, E>
where
    T: Send + 'static,
    E: Error + Send + Sync + 'static,
{
    source.transform(CircuitBreakerTransform::of(breaker))
}

/// Guard `source` with `breaker`, recovering denials and failures with `recover`.
pub fn breaker_recover<T, E, F>(
    source: Promise<T, E>,
    breaker: Arc<dyn CircuitBreaker>,
    recover: F,
) -> Promise<T, E>
where
    T: Send + 'static,
    E: Error + Send + Sync + 'static,
    F: Fn(ResilienceError<E>) -> Result<T, ResilienceError<E>> + Send + Sync + 'static,
{
    source.transform(CircuitBreakerTransform::of(breaker).recover(recover))
}

/// Guard `source` with `limiter`.
pub fn rate_limit<T, E>(source: Promise<T, E>, limiter: Arc<dyn RateLimiter>) -> Promise<T, E>
where
    T: Send + 'static,
    E: Error + Send + Sync + 'static,
{
    source.transform(RateLimiterTransform::of(limiter))
}

/// Guard `source` with `limiter`, recovering denials and failures with `recover`.
pub fn rate_limit_recover<T, E, F>(
    source: Promise<T, E>,
    limiter: Arc<dyn RateLimiter>,
    recover: F,
) -> Promise<T, E>
where
    T: Send + 'static,
    E: Error + Send + Sync + 'static,
    F: Fn(ResilienceError<E>) -> Result<T, ResilienceError<E>> + Send + Sync + 'static,
{
    source.transform(RateLimiterTransform::of(limiter).recover(recover))
}

/// Re-subscribe `source` according to `retry`.
pub fn retry<T, E>(source: Promise<T, E>, retry: Arc<dyn Retry>) -> Promise<T, E>
where
    T: Send + 'static,
    E: Error + Send + Sync + 'static,
{
    source.transform(RetryTransform::of(retry))
}

/// Re-subscribe `source` according to `retry`, recovering exhaustion with `recover`.
pub fn retry_recover<T, E, F>(
    source: Promise<T, E>,
    retry: Arc<dyn Retry>,
    recover: F,
) -> Promise<T, E>
where
    T: Send + 'static,
    E: Error + Send + Sync + 'static,
    F: Fn(ResilienceError<E>) -> Result<T, ResilienceError<E>> + Send + Sync + 'static,
{
    source.transform(RetryTransform::of(retry).recover(recover))
}
