//! Shape dispatch: route one unit of work through one policy.
//!
//! Work comes in one of four shapes, and the guarded result keeps the same shape.
//!
//! Under a circuit breaker or rate limiter:
//! - `Deferred`: gated transform; nothing runs until subscribed.
//! - `Stream`: [`GuardedStream`]; the permit is requested on first poll.
//! - `Future`: permit requested now; [`GuardedFuture`](crate::GuardedFuture) records the outcome.
//! - `Immediate`: permit, run, record, recover.
//!
//! Under retry, deferred sources are re-subscribed, future factories and synchronous calls are
//! re-invoked per attempt, and streams pass through unchanged.

use crate::future::admit;
use crate::gate::Gate;
use crate::promise::Promise;
use crate::recovery::Recovery;
use crate::registry::PolicyHandle;
use crate::retry::{retry_async, retry_blocking, Retry};
use crate::stream::GuardedStream;
use crate::transform::{GatedTransform, RetryTransform, Transform};
use crate::ResilienceError;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{BoxStream, Stream};
use std::error::Error;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Builds one attempt of an async call.
pub type FutureFactory<T, E> =
    Box<dyn FnMut() -> BoxFuture<'static, Result<T, ResilienceError<E>>> + Send>;

/// A synchronous call.
pub type ImmediateCall<T, E> = Box<dyn FnMut() -> Result<T, ResilienceError<E>> + Send>;

/// Result shape of a unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// Deferred single-value source.
    Deferred,
    /// Multi-item stream.
    Stream,
    /// Future.
    Future,
    /// Synchronous call.
    Immediate,
}

/// A unit of work, classified by how it produces its result.
pub enum Work<T, E> {
    /// A deferred single-value source.
    Deferred(Promise<T, E>),
    /// A stream of items.
    Stream(BoxStream<'static, Result<T, ResilienceError<E>>>),
    /// A future, built fresh for each attempt.
    Future(FutureFactory<T, E>),
    /// A synchronous call, run for each attempt.
    Immediate(ImmediateCall<T, E>),
}

impl<T, E> fmt::Debug for Work<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Work").field(&self.shape()).finish()
    }
}

impl<T, E> Work<T, E> {
    /// Wrap a deferred source.
    pub fn deferred(promise: Promise<T, E>) -> Self {
        Work::Deferred(promise)
    }

    /// Wrap a stream.
    pub fn stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<T, ResilienceError<E>>> + Send + 'static,
    {
        Work::Stream(Box::pin(stream))
    }

    /// Wrap an async call.
    pub fn future<F, Fut>(mut factory: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, ResilienceError<E>>> + Send + 'static,
    {
        Work::Future(Box::new(move || factory().boxed()))
    }

    /// Wrap a synchronous call.
    pub fn immediate<F>(call: F) -> Self
    where
        F: FnMut() -> Result<T, ResilienceError<E>> + Send + 'static,
    {
        Work::Immediate(Box::new(call))
    }

    /// Shape of this work.
    pub fn shape(&self) -> Shape {
        match self {
            Work::Deferred(_) => Shape::Deferred,
            Work::Stream(_) => Shape::Stream,
            Work::Future(_) => Shape::Future,
            Work::Immediate(_) => Shape::Immediate,
        }
    }

    /// Produce the result without any policy. Immediate work runs now.
    pub fn run_unguarded(self) -> Guarded<T, E> {
        match self {
            Work::Deferred(promise) => Guarded::Deferred(promise),
            Work::Stream(stream) => Guarded::Stream(stream),
            Work::Future(mut factory) => Guarded::Future(factory()),
            Work::Immediate(mut call) => Guarded::Immediate(call()),
        }
    }
}

/// Policy-guarded result, in the same shape as the [`Work`] it came from.
pub enum Guarded<T, E> {
    /// Guarded deferred source; nothing has run yet.
    Deferred(Promise<T, E>),
    /// Guarded stream; nothing has run yet.
    Stream(BoxStream<'static, Result<T, ResilienceError<E>>>),
    /// Guarded future.
    Future(BoxFuture<'static, Result<T, ResilienceError<E>>>),
    /// Result of a synchronous call, already settled.
    Immediate(Result<T, ResilienceError<E>>),
}

impl<T, E> fmt::Debug for Guarded<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Guarded").field(&self.shape()).finish()
    }
}

impl<T, E> Guarded<T, E> {
    /// Shape of this result.
    pub fn shape(&self) -> Shape {
        match self {
            Guarded::Deferred(_) => Shape::Deferred,
            Guarded::Stream(_) => Shape::Stream,
            Guarded::Future(_) => Shape::Future,
            Guarded::Immediate(_) => Shape::Immediate,
        }
    }

    /// The deferred source, if that is the shape.
    pub fn into_deferred(self) -> Option<Promise<T, E>> {
        match self {
            Guarded::Deferred(promise) => Some(promise),
            _ => None,
        }
    }

    /// The stream, if that is the shape.
    pub fn into_stream(self) -> Option<BoxStream<'static, Result<T, ResilienceError<E>>>> {
        match self {
            Guarded::Stream(stream) => Some(stream),
            _ => None,
        }
    }

    /// The future, if that is the shape.
    pub fn into_boxed_future(self) -> Option<BoxFuture<'static, Result<T, ResilienceError<E>>>> {
        match self {
            Guarded::Future(fut) => Some(fut),
            _ => None,
        }
    }

    /// The settled result, if that is the shape.
    pub fn into_immediate(self) -> Option<Result<T, ResilienceError<E>>> {
        match self {
            Guarded::Immediate(result) => Some(result),
            _ => None,
        }
    }
}

/// Route `work` through the policy behind `handle`.
///
/// Exactly one strategy applies per input; the output keeps the input's shape.
pub fn dispatch<T, E>(
    handle: &PolicyHandle,
    recovery: Option<Recovery<T, E>>,
    work: Work<T, E>,
) -> Guarded<T, E>
where
    T: Send + 'static,
    E: Error + Send + Sync + 'static,
{
    match handle {
        PolicyHandle::CircuitBreaker(breaker) => {
            gated(Gate::Breaker(Arc::clone(breaker)), recovery, work)
        }
        PolicyHandle::RateLimiter(limiter) => {
            gated(Gate::Limiter(Arc::clone(limiter)), recovery, work)
        }
        PolicyHandle::Retry(retry) => retried(retry, recovery, work),
    }
}

fn gated<T, E>(gate: Gate, recovery: Option<Recovery<T, E>>, work: Work<T, E>) -> Guarded<T, E>
where
    T: Send + 'static,
    E: Error + Send + Sync + 'static,
{
    match work {
        Work::Deferred(promise) => {
            Guarded::Deferred(GatedTransform::new(gate, recovery).apply(promise))
        }
        Work::Stream(stream) => Guarded::Stream(Box::pin(GuardedStream::new(stream, gate, recovery))),
        Work::Future(mut factory) => Guarded::Future(Box::pin(admit(gate, recovery, || factory()))),
        Work::Immediate(mut call) => Guarded::Immediate(gate.run(recovery.as_ref(), || call())),
    }
}

fn retried<T, E>(
    retry: &Arc<dyn Retry>,
    recovery: Option<Recovery<T, E>>,
    work: Work<T, E>,
) -> Guarded<T, E>
where
    T: Send + 'static,
    E: Error + Send + Sync + 'static,
{
    match work {
        Work::Deferred(promise) => Guarded::Deferred(
            RetryTransform::of(Arc::clone(retry)).with_recovery(recovery).apply(promise),
        ),
        Work::Stream(stream) => {
            tracing::warn!(
                retry = %retry.name(),
                "Retry is not supported for streams; passing the stream through unguarded"
            );
            Guarded::Stream(stream)
        }
        Work::Future(factory) => {
            Guarded::Future(Box::pin(retry_async(Arc::clone(retry), recovery, factory)))
        }
        Work::Immediate(call) => {
            Guarded::Immediate(retry_blocking(retry.as_ref(), recovery.as_ref(), call))
        }
    }
}

/// Run a synchronous call under the policy behind `handle`.
///
/// Breakers and limiters are consulted before the call starts: a denied call never runs.
/// Retry re-runs the call, blocking between attempts.
pub fn run_guarded<T, E, F>(
    handle: &PolicyHandle,
    recovery: Option<&Recovery<T, E>>,
    call: F,
) -> Result<T, ResilienceError<E>>
where
    E: Error + Send + Sync + 'static,
    F: FnMut() -> Result<T, ResilienceError<E>>,
{
    match handle {
        PolicyHandle::CircuitBreaker(breaker) => {
            Gate::Breaker(Arc::clone(breaker)).run(recovery, call)
        }
        PolicyHandle::RateLimiter(limiter) => Gate::Limiter(Arc::clone(limiter)).run(recovery, call),
        PolicyHandle::Retry(retry) => retry_blocking(retry.as_ref(), recovery, call),
    }
}
