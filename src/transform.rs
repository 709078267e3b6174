//! Policy transforms over deferred push sources.
//!
//! A transform wraps a [`Promise`] in a new promise that applies the policy every time it is
//! subscribed. Nothing happens at transform time.

mod circuit_breaker;
mod rate_limiter;
mod retry;

pub use circuit_breaker::CircuitBreakerTransform;
pub use rate_limiter::RateLimiterTransform;
pub use retry::RetryTransform;

use crate::gate::{Admission, Gate};
use crate::promise::{deliver, BoxDownstream, Downstream, Promise, Upstream};
use crate::recovery::{recover_or_propagate, Recovery};
use crate::ResilienceError;
use std::error::Error;
use std::sync::Arc;

/// Rewrites a source into a policy-guarded source.
pub trait Transform<T, E> {
    /// Wrap `source`.
    fn apply(self, source: Promise<T, E>) -> Promise<T, E>;
}

/// Permit, then record the single terminal signal. An empty completion records nothing.
pub(crate) struct GatedTransform<T, E> {
    gate: Gate,
    recovery: Option<Recovery<T, E>>,
}

impl<T, E> GatedTransform<T, E>
where
    T: Send + 'static,
    E: Error + Send + Sync + 'static,
{
    pub(crate) fn new(gate: Gate, recovery: Option<Recovery<T, E>>) -> Self {
        Self { gate, recovery }
    }

    pub(crate) fn apply(self, source: Promise<T, E>) -> Promise<T, E> {
        Promise::from_upstream(GatedUpstream {
            gate: self.gate,
            recovery: self.recovery,
            upstream: source.into_upstream(),
        })
    }
}

struct GatedUpstream<T, E> {
    gate: Gate,
    recovery: Option<Recovery<T, E>>,
    upstream: Arc<dyn Upstream<T, E>>,
}

impl<T, E> Upstream<T, E> for GatedUpstream<T, E>
where
    T: Send + 'static,
    E: Error + Send + Sync + 'static,
{
    fn connect(&self, down: BoxDownstream<T, E>) {
        let admission = match self.gate.admit() {
            Ok(admission) => admission,
            Err(denied) => {
                deliver(down, recover_or_propagate(self.recovery.as_ref(), denied));
                return;
            }
        };
        self.upstream.connect(Box::new(GatedDownstream {
            admission,
            recovery: self.recovery.clone(),
            down,
        }));
    }
}

/// Dropped unsignalled, the admission gives its permit back.
struct GatedDownstream<T, E> {
    admission: Admission,
    recovery: Option<Recovery<T, E>>,
    down: BoxDownstream<T, E>,
}

impl<T, E> Downstream<T, E> for GatedDownstream<T, E>
where
    T: Send + 'static,
    E: Error + Send + Sync + 'static,
{
    fn success(self: Box<Self>, value: T) {
        let GatedDownstream { mut admission, down, .. } = *self;
        admission.succeed();
        down.success(value);
    }

    fn error(self: Box<Self>, error: ResilienceError<E>) {
        let GatedDownstream { mut admission, recovery, down } = *self;
        admission.fail(&error);
        deliver(down, recover_or_propagate(recovery.as_ref(), error));
    }

    fn complete(self: Box<Self>) {
        let GatedDownstream { admission, down, .. } = *self;
        drop(admission);
        down.complete();
    }
}
