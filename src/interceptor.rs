//! Call-site policy binding.
//!
//! A [`PolicyBinding`] names the policy a call should go through; the [`Interceptor`] resolves
//! it against a [`PolicyRegistry`] at call time. A binding whose name is not registered leaves
//! the call unguarded.
//!
//! ```
//! use shapeguard::{
//!     CircuitBreakerPolicy, Interceptor, PolicyBinding, PolicyRegistry, ResilienceError, Work,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let registry = Arc::new(PolicyRegistry::new());
//! registry.register_circuit_breaker(Arc::new(
//!     CircuitBreakerPolicy::new("inventory", 5, Duration::from_secs(30)).unwrap(),
//! ));
//!
//! let interceptor = Interceptor::new(registry);
//! let binding = PolicyBinding::<u32, std::io::Error>::circuit_breaker("inventory").recover(|_| Ok(0));
//! let stock = interceptor.invoke(&binding, Work::immediate(|| Ok(12)));
//! assert_eq!(stock.into_immediate().unwrap().unwrap(), 12);
//! ```

use crate::dispatch::{dispatch, run_guarded, Guarded, Work};
use crate::recovery::Recovery;
use crate::registry::{PolicyKind, PolicyRegistry};
use crate::ResilienceError;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Which named policy guards a call, and how its failures are recovered.
pub struct PolicyBinding<T, E> {
    kind: PolicyKind,
    name: String,
    recovery: Option<Recovery<T, E>>,
}

impl<T, E> Clone for PolicyBinding<T, E> {
    fn clone(&self) -> Self {
        Self { kind: self.kind, name: self.name.clone(), recovery: self.recovery.clone() }
    }
}

impl<T, E> fmt::Debug for PolicyBinding<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyBinding")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("recovery", &self.recovery.is_some())
            .finish()
    }
}

impl<T, E> PolicyBinding<T, E> {
    /// Bind to a policy of `kind` named `name`.
    pub fn new(kind: PolicyKind, name: impl Into<String>) -> Self {
        Self { kind, name: name.into(), recovery: None }
    }

    /// Bind to the circuit breaker `name`.
    pub fn circuit_breaker(name: impl Into<String>) -> Self {
        Self::new(PolicyKind::CircuitBreaker, name)
    }

    /// Bind to the rate limiter `name`.
    pub fn rate_limiter(name: impl Into<String>) -> Self {
        Self::new(PolicyKind::RateLimiter, name)
    }

    /// Bind to the retry policy `name`.
    pub fn retry(name: impl Into<String>) -> Self {
        Self::new(PolicyKind::Retry, name)
    }

    /// Recover failures with `f`.
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

    /// Policy kind.
    pub fn kind(&self) -> PolicyKind {
        self.kind
    }

    /// Policy name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Resolves bindings and applies the bound policy to work.
#[derive(Clone, Debug)]
pub struct Interceptor {
    registry: Arc<PolicyRegistry>,
}

impl Interceptor {
    /// Interceptor over `registry`.
    pub fn new(registry: Arc<PolicyRegistry>) -> Self {
        Self { registry }
    }

    /// The registry bindings resolve against.
    pub fn registry(&self) -> &PolicyRegistry {
        &self.registry
    }

    /// Guard `work` with the bound policy. Unbound names run the work unguarded.
    pub fn invoke<T, E>(&self, binding: &PolicyBinding<T, E>, work: Work<T, E>) -> Guarded<T, E>
    where
        T: Send + 'static,
        E: Error + Send + Sync + 'static,
    {
        match self.registry.resolve(binding.kind, &binding.name) {
            Some(handle) => dispatch(&handle, binding.recovery.clone(), work),
            None => {
                tracing::debug!(
                    kind = %binding.kind,
                    name = %binding.name,
                    "No policy registered for binding; running unguarded"
                );
                work.run_unguarded()
            }
        }
    }

    /// Run a synchronous call with the bound policy. Unbound names run the call once.
    pub fn call<T, E, F>(
        &self,
        binding: &PolicyBinding<T, E>,
        mut call: F,
    ) -> Result<T, ResilienceError<E>>
    where
        E: Error + Send + Sync + 'static,
        F: FnMut() -> Result<T, ResilienceError<E>>,
    {
        match self.registry.resolve(binding.kind, &binding.name) {
            Some(handle) => run_guarded(&handle, binding.recovery.as_ref(), call),
            None => {
                tracing::debug!(
                    kind = %binding.kind,
                    name = %binding.name,
                    "No policy registered for binding; running unguarded"
                );
                call()
            }
        }
    }
}
