//! Guarding for futures.

use crate::gate::{Admission, Gate};
use crate::recovery::{recover_or_propagate, Recovery};
use crate::ResilienceError;
use futures::ready;
use pin_project::pin_project;
use std::error::Error;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

#[pin_project(project = StateProj)]
enum State<F, T, E> {
    Running {
        #[pin]
        inner: F,
        admission: Admission,
        recovery: Option<Recovery<T, E>>,
    },
    Settled {
        result: Option<Result<T, ResilienceError<E>>>,
    },
}

/// A future under a circuit breaker or rate limiter.
///
/// Permission is decided when the future is created; a denied future is already settled
/// with the recovery result (or the denial) and the inner future is never built. Dropping a
/// permitted future before it completes records nothing and releases the permit.
#[pin_project]
pub struct GuardedFuture<F, T, E> {
    #[pin]
    state: State<F, T, E>,
}

impl<F, T, E> fmt::Debug for GuardedFuture<F, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            State::Running { .. } => "running",
            State::Settled { .. } => "settled",
        };
        f.debug_struct("GuardedFuture").field("state", &state).finish()
    }
}

/// Check the gate, then build the inner future with `make` only if permitted.
pub(crate) fn admit<F, T, E, M>(
    gate: Gate,
    recovery: Option<Recovery<T, E>>,
    make: M,
) -> GuardedFuture<F, T, E>
where
    M: FnOnce() -> F,
{
    let state = match gate.admit() {
        Ok(admission) => State::Running { inner: make(), admission, recovery },
        Err(denied) => {
            State::Settled { result: Some(recover_or_propagate(recovery.as_ref(), denied)) }
        }
    };
    GuardedFuture { state }
}

impl<F, T, E> Future for GuardedFuture<F, T, E>
where
    F: Future<Output = Result<T, ResilienceError<E>>>,
    E: Error + 'static,
{
    type Output = Result<T, ResilienceError<E>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut this = self.project();
        let output = match this.state.as_mut().project() {
            StateProj::Running { inner, admission, recovery } => {
                match ready!(inner.poll(cx)) {
                    Ok(value) => {
                        admission.succeed();
                        Ok(value)
                    }
                    Err(err) => {
                        admission.fail(&err);
                        recover_or_propagate(recovery.as_ref(), err)
                    }
                }
            }
            StateProj::Settled { result } => {
                return Poll::Ready(result.take().unwrap_or(Err(ResilienceError::Incomplete)));
            }
        };
        this.state.set(State::Settled { result: None });
        Poll::Ready(output)
    }
}
