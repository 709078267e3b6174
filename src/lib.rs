#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # Shapeguard
//!
//! Circuit breakers, rate limiters and retries for every shape of asynchronous work.
//!
//! A call can return a deferred [`Promise`], a stream, a future, or a plain value. Each policy
//! is applied to each shape with the same contract: permission is checked before any work
//! starts, exactly one outcome is recorded per guarded execution, and an optional
//! [`Recovery`] turns failures into fallback values.
//!
//! ## Features
//!
//! - **Transforms** that guard a [`Promise`] pipeline ([`CircuitBreakerTransform`],
//!   [`RateLimiterTransform`], [`RetryTransform`]) plus the [`facade`] helpers
//! - **Shape dispatch** ([`dispatch`]) for streams, futures and synchronous calls
//! - **Named policies** in a [`PolicyRegistry`], bound at call sites through an [`Interceptor`]
//! - **Tower middleware** via [`GuardLayer`]
//! - **Declarative config** (`config` feature) building a registry from JSON
//!
//! ## Quick Start
//!
//! ```rust
//! use shapeguard::{CircuitBreakerPolicy, CircuitBreakerTransform, Promise};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let breaker = Arc::new(CircuitBreakerPolicy::new("api", 5, Duration::from_secs(30)).unwrap());
//!
//!     let reply = Promise::<_, std::io::Error>::from_fn(|| Ok("pong"))
//!         .transform(CircuitBreakerTransform::of(breaker).recover(|_| Ok("fallback")))
//!         .await;
//!
//!     assert_eq!(reply.unwrap(), "pong");
//! }
//! ```

pub mod circuit_breaker;
pub mod clock;
#[cfg(feature = "config")]
pub mod config;
pub mod dispatch;
pub mod error;
pub mod facade;
pub mod future;
mod gate;
pub mod interceptor;
pub mod interval;
pub mod layer;
pub mod outcome;
pub mod prelude;
pub mod promise;
pub mod rate_limiter;
pub mod recovery;
pub mod registry;
pub mod retry;
pub mod sleeper;
pub mod stream;
pub mod transform;

// Re-exports
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerPolicy, CircuitState,
};
pub use clock::{Clock, ManualClock, MonotonicClock};
#[cfg(feature = "config")]
pub use config::{
    CircuitBreakerSettings, ConfigError, RateLimiterSettings, ResilienceConfig, RetrySettings,
};
pub use dispatch::{dispatch, run_guarded, FutureFactory, Guarded, ImmediateCall, Shape, Work};
pub use error::ResilienceError;
pub use future::GuardedFuture;
pub use interceptor::{Interceptor, PolicyBinding};
pub use interval::{IntervalError, IntervalFn, MAX_INTERVAL};
pub use layer::{GuardLayer, GuardService};
pub use outcome::{Outcome, StopWatch};
pub use promise::{BoxDownstream, Downstream, Promise, Signal, SignalFuture, Upstream};
pub use rate_limiter::{
    RateLimiter, RateLimiterConfig, RateLimiterConfigError, RateLimiterPolicy, WaitInterrupted,
};
pub use recovery::Recovery;
pub use registry::{PolicyHandle, PolicyKind, PolicyRegistry};
pub use retry::{
    retry_async, retry_blocking, BuildError, Retry, RetryDecision, RetryPolicy,
    RetryPolicyBuilder, RetryState,
};
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
pub use stream::GuardedStream;
pub use transform::{CircuitBreakerTransform, RateLimiterTransform, RetryTransform, Transform};
