use super::{GatedTransform, Transform};
use crate::circuit_breaker::CircuitBreaker;
use crate::gate::Gate;
use crate::promise::Promise;
use crate::recovery::Recovery;
use crate::ResilienceError;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Guards a source with a circuit breaker.
///
/// On subscribe the breaker is asked for permission. A denied call never connects the source
/// and fails with [`ResilienceError::CircuitOpen`]; a permitted call reports its single
/// terminal outcome to the breaker together with the elapsed time.
///
/// ```
/// use shapeguard::{CircuitBreakerPolicy, CircuitBreakerTransform, Promise};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let breaker = Arc::new(CircuitBreakerPolicy::new("api", 5, Duration::from_secs(30)).unwrap());
/// let guarded = Promise::<_, std::io::Error>::value("real")
///     .transform(CircuitBreakerTransform::of(breaker).recover(|_| Ok("fallback")));
/// assert_eq!(guarded.await.unwrap(), "real");
/// # });
/// ```
pub struct CircuitBreakerTransform<T, E> {
    breaker: Arc<dyn CircuitBreaker>,
    recovery: Option<Recovery<T, E>>,
}

impl<T, E> fmt::Debug for CircuitBreakerTransform<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerTransform")
            .field("breaker", &self.breaker.name())
            .field("recovery", &self.recovery.is_some())
            .finish()
    }
}

impl<T, E> CircuitBreakerTransform<T, E> {
    /// Transform guarded by `breaker`, failures propagate.
    pub fn of(breaker: Arc<dyn CircuitBreaker>) -> Self {
        Self { breaker, recovery: None }
    }

    /// Substitute the result of `f` for denials and failures.
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

impl<T, E> Transform<T, E> for CircuitBreakerTransform<T, E>
where
    T: Send + 'static,
    E: Error + Send + Sync + 'static,
{
    fn apply(self, source: Promise<T, E>) -> Promise<T, E> {
        GatedTransform::new(Gate::Breaker(self.breaker), self.recovery).apply(source)
    }
}
