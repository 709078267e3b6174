//! Deferred single-value push sources.
//!
//! A [`Promise`] does nothing until it is connected to a [`Downstream`], which then receives
//! exactly one terminal signal: a value, a failure, or completion without a value. Every
//! connection re-runs the underlying work, which is what lets retry resubscribe the origin.
//!
//! ```
//! use shapeguard::{Promise, ResilienceError};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let promise: Promise<u32, std::io::Error> = Promise::from_fn(|| Ok(42));
//! assert_eq!(promise.await.unwrap(), 42);
//! # });
//! ```

use crate::transform::Transform;
use crate::ResilienceError;
use futures::future::{FutureExt, Map};
use std::fmt;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Receiver of a source's terminal signal.
///
/// Each method consumes the downstream, so at most one signal is ever delivered.
pub trait Downstream<T, E>: Send {
    /// The source produced a value.
    fn success(self: Box<Self>, value: T);
    /// The source failed.
    fn error(self: Box<Self>, error: ResilienceError<E>);
    /// The source finished without a value.
    fn complete(self: Box<Self>);
}

/// Owned, type-erased downstream.
pub type BoxDownstream<T, E> = Box<dyn Downstream<T, E>>;

/// Something a downstream can be connected to.
pub trait Upstream<T, E>: Send + Sync {
    /// Start the work and deliver its signal to `down`.
    fn connect(&self, down: BoxDownstream<T, E>);
}

/// Terminal signal of a source.
#[derive(Debug)]
pub enum Signal<T, E> {
    /// A value.
    Success(T),
    /// A failure.
    Failure(ResilienceError<E>),
    /// Completion without a value.
    Complete,
}

impl<T, E> Signal<T, E> {
    /// Collapse into a `Result`; completion becomes [`ResilienceError::Incomplete`].
    pub fn into_result(self) -> Result<T, ResilienceError<E>> {
        match self {
            Signal::Success(value) => Ok(value),
            Signal::Failure(error) => Err(error),
            Signal::Complete => Err(ResilienceError::Incomplete),
        }
    }

    /// Whether this signal carries a value.
    pub fn is_success(&self) -> bool {
        matches!(self, Signal::Success(_))
    }
}

impl<T, E> From<Result<T, ResilienceError<E>>> for Signal<T, E> {
    fn from(result: Result<T, ResilienceError<E>>) -> Self {
        match result {
            Ok(value) => Signal::Success(value),
            Err(error) => Signal::Failure(error),
        }
    }
}

pub(crate) fn deliver<T, E>(down: BoxDownstream<T, E>, result: Result<T, ResilienceError<E>>) {
    match result {
        Ok(value) => down.success(value),
        Err(error) => down.error(error),
    }
}

struct FnUpstream<F>(F);

impl<T, E, F> Upstream<T, E> for FnUpstream<F>
where
    F: Fn(BoxDownstream<T, E>) + Send + Sync,
{
    fn connect(&self, down: BoxDownstream<T, E>) {
        (self.0)(down)
    }
}

struct CallbackDownstream<F>(F);

impl<T, E, F> Downstream<T, E> for CallbackDownstream<F>
where
    F: FnOnce(Signal<T, E>) + Send,
{
    fn success(self: Box<Self>, value: T) {
        let CallbackDownstream(callback) = *self;
        callback(Signal::Success(value))
    }

    fn error(self: Box<Self>, error: ResilienceError<E>) {
        let CallbackDownstream(callback) = *self;
        callback(Signal::Failure(error))
    }

    fn complete(self: Box<Self>) {
        let CallbackDownstream(callback) = *self;
        callback(Signal::Complete)
    }
}

/// A deferred single-value source.
///
/// Consuming APIs ([`connect`](Promise::connect), [`subscribe`](Promise::subscribe),
/// `.await`) take `self`, so a promise is subscribed at most once.
pub struct Promise<T, E> {
    upstream: Arc<dyn Upstream<T, E>>,
}

impl<T, E> fmt::Debug for Promise<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise").finish_non_exhaustive()
    }
}

impl<T, E> Promise<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Build a promise from a connect function, called once per subscription.
    pub fn new<F>(connect: F) -> Self
    where
        F: Fn(BoxDownstream<T, E>) + Send + Sync + 'static,
    {
        Self::from_upstream(FnUpstream(connect))
    }

    /// Build a promise over any [`Upstream`].
    pub fn from_upstream<U>(upstream: U) -> Self
    where
        U: Upstream<T, E> + 'static,
    {
        Self { upstream: Arc::new(upstream) }
    }

    /// A promise that always yields `value`.
    pub fn value(value: T) -> Self
    where
        T: Clone + Sync,
    {
        Self::new(move |down| down.success(value.clone()))
    }

    /// A promise that always fails with `error`.
    pub fn error(error: ResilienceError<E>) -> Self
    where
        E: Clone + Sync,
    {
        Self::new(move |down| down.error(error.clone()))
    }

    /// A promise that runs `f` on the connecting thread.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn() -> Result<T, ResilienceError<E>> + Send + Sync + 'static,
    {
        Self::new(move |down| deliver(down, f()))
    }

    /// A promise that runs a fresh future per subscription.
    ///
    /// Inside a tokio runtime the future is spawned and the signal arrives from the spawned
    /// task; otherwise it is driven to completion on the connecting thread.
    pub fn from_future<F, Fut>(factory: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ResilienceError<E>>> + Send + 'static,
    {
        Self::new(move |down| {
            let fut = factory();
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move { deliver(down, fut.await) });
                }
                Err(_) => deliver(down, futures::executor::block_on(fut)),
            }
        })
    }

    /// Start the work, delivering its signal to `down`.
    pub fn connect(self, down: BoxDownstream<T, E>) {
        self.upstream.connect(down)
    }

    /// Start the work, delivering its signal to `callback`.
    pub fn subscribe<F>(self, callback: F)
    where
        F: FnOnce(Signal<T, E>) + Send + 'static,
    {
        self.connect(Box::new(CallbackDownstream(callback)))
    }

    /// Apply a transform.
    pub fn transform<X>(self, transform: X) -> Self
    where
        X: Transform<T, E>,
    {
        transform.apply(self)
    }

    /// Future resolving to the terminal signal; the work starts on first poll.
    pub fn signal(self) -> SignalFuture<T, E> {
        SignalFuture { promise: Some(self), rx: None }
    }

    pub(crate) fn into_upstream(self) -> Arc<dyn Upstream<T, E>> {
        self.upstream
    }
}

struct OneshotDownstream<T, E> {
    tx: oneshot::Sender<Signal<T, E>>,
}

impl<T: Send, E: Send> Downstream<T, E> for OneshotDownstream<T, E> {
    fn success(self: Box<Self>, value: T) {
        let OneshotDownstream { tx } = *self;
        let _ = tx.send(Signal::Success(value));
    }

    fn error(self: Box<Self>, error: ResilienceError<E>) {
        let OneshotDownstream { tx } = *self;
        let _ = tx.send(Signal::Failure(error));
    }

    fn complete(self: Box<Self>) {
        let OneshotDownstream { tx } = *self;
        let _ = tx.send(Signal::Complete);
    }
}

/// Future returned by [`Promise::signal`].
///
/// A source that drops its downstream without signalling resolves to [`Signal::Complete`].
pub struct SignalFuture<T, E> {
    promise: Option<Promise<T, E>>,
    rx: Option<oneshot::Receiver<Signal<T, E>>>,
}

impl<T, E> fmt::Debug for SignalFuture<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalFuture")
            .field("started", &self.promise.is_none())
            .finish()
    }
}

impl<T, E> Future for SignalFuture<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    type Output = Signal<T, E>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(promise) = self.promise.take() {
            let (tx, rx) = oneshot::channel();
            self.rx = Some(rx);
            promise.connect(Box::new(OneshotDownstream { tx }));
        }
        match self.rx.as_mut() {
            Some(rx) => rx.poll_unpin(cx).map(|received| received.unwrap_or(Signal::Complete)),
            None => Poll::Ready(Signal::Complete),
        }
    }
}

impl<T, E> IntoFuture for Promise<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    type Output = Result<T, ResilienceError<E>>;
    type IntoFuture = Map<SignalFuture<T, E>, fn(Signal<T, E>) -> Result<T, ResilienceError<E>>>;

    fn into_future(self) -> Self::IntoFuture {
        self.signal().map(Signal::into_result as fn(_) -> _)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct TestError(&'static str);

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    impl std::error::Error for TestError {}

    #[test]
    fn nothing_runs_until_connected() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let promise: Promise<u32, TestError> = Promise::from_fn(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(1)
        });
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        let seen = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&seen);
        promise.subscribe(move |signal| *slot.lock().unwrap() = Some(signal.into_result()));

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(seen.lock().unwrap().take().unwrap().unwrap(), 1);
    }

    #[tokio::test]
    async fn await_maps_signals_to_results() {
        let ok: Promise<u32, TestError> = Promise::value(3);
        assert_eq!(ok.await.unwrap(), 3);

        let failed: Promise<u32, TestError> = Promise::error(ResilienceError::Inner(TestError("x")));
        assert_eq!(failed.await.unwrap_err().into_inner(), Some(TestError("x")));

        let empty: Promise<u32, TestError> = Promise::new(|down| down.complete());
        assert!(empty.await.unwrap_err().is_incomplete());
    }

    #[tokio::test]
    async fn dropped_downstream_resolves_to_complete() {
        let silent: Promise<u32, TestError> = Promise::new(|down| drop(down));
        assert!(matches!(silent.signal().await, Signal::Complete));
    }

    #[tokio::test]
    async fn from_future_runs_a_fresh_future_per_connect() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let promise: Promise<usize, TestError> = Promise::from_future(move || {
            let counter = Arc::clone(&counter);
            async move { Ok(counter.fetch_add(1, Ordering::SeqCst) + 1) }
        });
        let upstream = promise.into_upstream();

        let first = Promise { upstream: Arc::clone(&upstream) }.await.unwrap();
        let second = Promise { upstream }.await.unwrap();

        assert_eq!((first, second), (1, 2));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn from_future_outside_runtime_completes_inline() {
        let promise: Promise<&str, TestError> = Promise::from_future(|| async { Ok("inline") });
        let seen = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&seen);
        promise.subscribe(move |signal| *slot.lock().unwrap() = Some(signal.is_success()));
        assert_eq!(*seen.lock().unwrap(), Some(true));
    }

    #[tokio::test]
    async fn signal_does_not_start_work_before_poll() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let promise: Promise<u32, TestError> = Promise::from_fn(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(9)
        });
        let pending = promise.signal();
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert!(pending.await.is_success());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
