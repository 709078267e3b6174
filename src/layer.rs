//! Tower middleware applying a circuit breaker or rate limiter to every call.
//!
//! Each request goes through the future strategy: permission is checked when the request is
//! issued, and the response future records its outcome when it settles. Denied requests never
//! reach the inner service. Limiter waits block the thread issuing the request, so a limiter
//! used here normally has a short timeout.

use crate::circuit_breaker::CircuitBreaker;
use crate::future::{admit, GuardedFuture};
use crate::gate::Gate;
use crate::rate_limiter::RateLimiter;
use crate::registry::PolicyHandle;
use crate::ResilienceError;
use futures::future::{MapErr, TryFutureExt};
use std::error::Error;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower_layer::Layer;
use tower_service::Service;

/// A layer that guards a service with a circuit breaker or rate limiter.
#[derive(Clone, Debug)]
pub struct GuardLayer {
    gate: Gate,
}

impl GuardLayer {
    /// Guard with a circuit breaker.
    pub fn circuit_breaker(breaker: Arc<dyn CircuitBreaker>) -> Self {
        Self { gate: Gate::Breaker(breaker) }
    }

    /// Guard with a rate limiter.
    pub fn rate_limiter(limiter: Arc<dyn RateLimiter>) -> Self {
        Self { gate: Gate::Limiter(limiter) }
    }

    /// Guard with a resolved policy. Retry has no per-request gate and yields `None`.
    pub fn from_handle(handle: &PolicyHandle) -> Option<Self> {
        match handle {
            PolicyHandle::CircuitBreaker(breaker) => Some(Self::circuit_breaker(Arc::clone(breaker))),
            PolicyHandle::RateLimiter(limiter) => Some(Self::rate_limiter(Arc::clone(limiter))),
            PolicyHandle::Retry(_) => None,
        }
    }
}

impl<S> Layer<S> for GuardLayer {
    type Service = GuardService<S>;

    fn layer(&self, service: S) -> Self::Service {
        GuardService { inner: service, gate: self.gate.clone() }
    }
}

/// Middleware service created by [`GuardLayer`].
#[derive(Clone, Debug)]
pub struct GuardService<S> {
    inner: S,
    gate: Gate,
}

type IntoInner<E> = fn(E) -> ResilienceError<E>;

impl<S, Req> Service<Req> for GuardService<S>
where
    S: Service<Req>,
    S::Error: Error + 'static,
{
    type Response = S::Response;
    type Error = ResilienceError<S::Error>;
    type Future = GuardedFuture<MapErr<S::Future, IntoInner<S::Error>>, S::Response, S::Error>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(ResilienceError::Inner)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let inner = &mut self.inner;
        admit(self.gate.clone(), None, move || {
            inner.call(req).map_err(ResilienceError::Inner as IntoInner<S::Error>)
        })
    }
}
