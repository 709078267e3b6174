use super::Transform;
use crate::promise::{deliver, BoxDownstream, Downstream, Promise, Upstream};
use crate::recovery::{recover_or_propagate, Recovery};
use crate::retry::{Retry, RetryDecision, RetryState};
use crate::ResilienceError;
use std::error::Error;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Re-subscribes a failing source according to a retry policy.
///
/// Every subscription gets its own [`RetryState`]. On each upstream failure the state decides
/// whether to reconnect the original source (after the returned delay) or give up; giving up
/// hands the last failure to the recovery, or propagates it unchanged. Denials from inner
/// policies are offered to the state like any other failure; fatal interruptions are never
/// retried.
pub struct RetryTransform<T, E> {
    retry: Arc<dyn Retry>,
    recovery: Option<Recovery<T, E>>,
}

impl<T, E> fmt::Debug for RetryTransform<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryTransform")
            .field("retry", &self.retry.name())
            .field("recovery", &self.recovery.is_some())
            .finish()
    }
}

impl<T, E> RetryTransform<T, E> {
    /// Transform driven by `retry`, exhaustion propagates.
    pub fn of(retry: Arc<dyn Retry>) -> Self {
        Self { retry, recovery: None }
    }

    /// Substitute the result of `f` once retries are exhausted.
    pub fn recover<F>(self, f: F) -> Self
    where
        F: Fn(ResilienceError<E>) -> Result<T, ResilienceError<E>> + Send + Sync + 'static,
    {
        self.with_recovery(Some(Recovery::new(f)))
    }

    /// Replace the recovery.
    pub fn with_recovery(mut self, recovery: Option<Recovery<T, E>>) -> Self {
        self.recovery = recovery;
        self
    }
}

impl<T, E> Transform<T, E> for RetryTransform<T, E>
where
    T: Send + 'static,
    E: Error + Send + Sync + 'static,
{
    fn apply(self, source: Promise<T, E>) -> Promise<T, E> {
        Promise::from_upstream(RetryUpstream {
            retry: self.retry,
            recovery: self.recovery,
            upstream: source.into_upstream(),
        })
    }
}

struct RetryUpstream<T, E> {
    retry: Arc<dyn Retry>,
    recovery: Option<Recovery<T, E>>,
    upstream: Arc<dyn Upstream<T, E>>,
}

impl<T, E> Upstream<T, E> for RetryUpstream<T, E>
where
    T: Send + 'static,
    E: Error + Send + Sync + 'static,
{
    fn connect(&self, down: BoxDownstream<T, E>) {
        Box::new(RetryDownstream {
            upstream: Arc::clone(&self.upstream),
            retry: Arc::clone(&self.retry),
            state: self.retry.new_state(),
            recovery: self.recovery.clone(),
            attempts: Arc::new(Mutex::new(Attempts { running: false, parked: None })),
            down,
        })
        .resubscribe();
    }
}

/// One subscription's attempts. The same instance is handed back to the upstream on every
/// reconnect so the retry state accumulates.
struct RetryDownstream<T, E> {
    upstream: Arc<dyn Upstream<T, E>>,
    retry: Arc<dyn Retry>,
    state: Box<dyn RetryState>,
    recovery: Option<Recovery<T, E>>,
    attempts: Arc<Mutex<Attempts<T, E>>>,
    down: BoxDownstream<T, E>,
}

/// Connect loop shared by one subscription's attempts.
///
/// A source that signals from inside `connect` re-enters the downstream on the same stack.
/// While a loop is running, a reconnect is parked here and the loop connects it once the
/// current `connect` returns, so the stack stays flat however many attempts fail in a row.
struct Attempts<T, E> {
    running: bool,
    parked: Option<Box<RetryDownstream<T, E>>>,
}

fn lock<X>(mutex: &Mutex<X>) -> MutexGuard<'_, X> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T, E> RetryDownstream<T, E>
where
    T: Send + 'static,
    E: Error + Send + Sync + 'static,
{
    fn finish(self: Box<Self>, error: ResilienceError<E>) {
        let RetryDownstream { recovery, down, .. } = *self;
        deliver(down, recover_or_propagate(recovery.as_ref(), error));
    }

    fn resubscribe(self: Box<Self>) {
        let attempts = Arc::clone(&self.attempts);
        {
            let mut guard = lock(&attempts);
            if guard.running {
                guard.parked = Some(self);
                return;
            }
            guard.running = true;
        }

        let mut next = self;
        loop {
            let upstream = Arc::clone(&next.upstream);
            upstream.connect(next);

            let mut guard = lock(&attempts);
            match guard.parked.take() {
                Some(parked) => next = parked,
                None => {
                    guard.running = false;
                    return;
                }
            }
        }
    }

    fn reconnect(self: Box<Self>, delay: Duration) {
        if delay.is_zero() {
            self.resubscribe();
            return;
        }

        let sleeper = self.retry.sleeper();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    sleeper.sleep(delay).await;
                    self.resubscribe();
                });
            }
            Err(_) => {
                sleeper.block(delay);
                self.resubscribe();
            }
        }
    }
}

impl<T, E> Downstream<T, E> for RetryDownstream<T, E>
where
    T: Send + 'static,
    E: Error + Send + Sync + 'static,
{
    fn success(self: Box<Self>, value: T) {
        let RetryDownstream { mut state, down, .. } = *self;
        state.on_success();
        down.success(value);
    }

    fn error(mut self: Box<Self>, error: ResilienceError<E>) {
        if error.is_fatal() {
            self.finish(error);
            return;
        }
        match self.state.on_error(error.as_hook_error()) {
            RetryDecision::Retry { delay } => {
                tracing::debug!(retry = %self.retry.name(), ?delay, "Reconnecting source");
                self.reconnect(delay);
            }
            RetryDecision::GiveUp => self.finish(error),
        }
    }

    fn complete(self: Box<Self>) {
        let RetryDownstream { down, .. } = *self;
        down.complete();
    }
}
