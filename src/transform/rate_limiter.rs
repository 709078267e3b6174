use super::{GatedTransform, Transform};
use crate::gate::Gate;
use crate::promise::Promise;
use crate::rate_limiter::RateLimiter;
use crate::recovery::Recovery;
use crate::ResilienceError;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Guards a source with a rate limiter.
///
/// On subscribe one permit is requested, blocking the subscribing thread for at most the
/// limiter's timeout. Without a permit the source is never connected and the call fails with
/// [`ResilienceError::RequestNotPermitted`]. An interrupted wait fails with the fatal
/// [`ResilienceError::Interrupted`], which bypasses recovery.
pub struct RateLimiterTransform<T, E> {
    limiter: Arc<dyn RateLimiter>,
    recovery: Option<Recovery<T, E>>,
}

impl<T, E> fmt::Debug for RateLimiterTransform<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiterTransform")
            .field("limiter", &self.limiter.name())
            .field("recovery", &self.recovery.is_some())
            .finish()
    }
}

impl<T, E> RateLimiterTransform<T, E> {
    /// Transform guarded by `limiter`, failures propagate.
    pub fn of(limiter: Arc<dyn RateLimiter>) -> Self {
        Self { limiter, recovery: None }
    }

    /// Substitute the result of `f` for denials and upstream failures.
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

impl<T, E> Transform<T, E> for RateLimiterTransform<T, E>
where
    T: Send + 'static,
    E: Error + Send + Sync + 'static,
{
    fn apply(self, source: Promise<T, E>) -> Promise<T, E> {
        GatedTransform::new(Gate::Limiter(self.limiter), self.recovery).apply(source)
    }
}
