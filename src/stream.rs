//! Guarding for multi-item push streams.

use crate::gate::{Admission, Gate};
use crate::recovery::{recover_or_propagate, Recovery};
use crate::ResilienceError;
use futures::ready;
use futures::Stream;
use pin_project::pin_project;
use std::error::Error;
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

#[derive(Debug)]
enum Phase {
    Idle,
    Running(Admission),
    Done,
}

/// A stream under a circuit breaker or rate limiter.
///
/// The permit is requested on first poll. A denial yields a single recovery item (or the
/// denial error) and ends the stream. While running, items pass through untouched; the first
/// error item is recorded as a failure and replaced by a single recovery item (or forwarded),
/// after which the stream ends. Reaching the end of the inner stream records a success.
/// Dropping the stream mid-flight records nothing and releases the permit.
#[pin_project]
pub struct GuardedStream<S, T, E> {
    #[pin]
    inner: S,
    gate: Gate,
    recovery: Option<Recovery<T, E>>,
    phase: Phase,
}

impl<S, T, E> GuardedStream<S, T, E> {
    pub(crate) fn new(inner: S, gate: Gate, recovery: Option<Recovery<T, E>>) -> Self {
        Self { inner, gate, recovery, phase: Phase::Idle }
    }
}

impl<S, T, E> fmt::Debug for GuardedStream<S, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardedStream")
            .field("gate", &self.gate)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

impl<S, T, E> Stream for GuardedStream<S, T, E>
where
    S: Stream<Item = Result<T, ResilienceError<E>>>,
    E: Error + 'static,
{
    type Item = Result<T, ResilienceError<E>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();

        match *this.phase {
            Phase::Done => return Poll::Ready(None),
            Phase::Running(_) => {}
            Phase::Idle => match this.gate.admit() {
                Ok(admission) => *this.phase = Phase::Running(admission),
                Err(denied) => {
                    *this.phase = Phase::Done;
                    return Poll::Ready(Some(recover_or_propagate(this.recovery.as_ref(), denied)));
                }
            },
        }

        let item = ready!(this.inner.poll_next(cx));
        if let Some(Ok(item)) = item {
            return Poll::Ready(Some(Ok(item)));
        }
        let Phase::Running(mut admission) = std::mem::replace(this.phase, Phase::Done) else {
            return Poll::Ready(None);
        };
        match item {
            Some(Err(err)) => {
                admission.fail(&err);
                Poll::Ready(Some(recover_or_propagate(this.recovery.as_ref(), err)))
            }
            _ => {
                admission.succeed();
                Poll::Ready(None)
            }
        }
    }
}
