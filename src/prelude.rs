//! Convenient re-exports for common Shapeguard types.
pub use crate::{
    circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerPolicy, CircuitState},
    dispatch::{dispatch, Guarded, Work},
    interceptor::{Interceptor, PolicyBinding},
    interval::IntervalFn,
    layer::GuardLayer,
    promise::{Promise, Signal},
    rate_limiter::{RateLimiter, RateLimiterConfig, RateLimiterPolicy},
    recovery::Recovery,
    registry::{PolicyKind, PolicyRegistry},
    retry::{Retry, RetryPolicy},
    transform::{CircuitBreakerTransform, RateLimiterTransform, RetryTransform, Transform},
    ResilienceError,
};
