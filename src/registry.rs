//! Named policy lookup.
//!
//! Policies are registered under their own name, one table per kind. Reads are lock-free
//! snapshots; writes swap in a new table, and the last registration for a name wins.

use crate::circuit_breaker::CircuitBreaker;
use crate::rate_limiter::RateLimiter;
use crate::retry::Retry;
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Kind of policy a name refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyKind {
    /// A [`CircuitBreaker`].
    CircuitBreaker,
    /// A [`RateLimiter`].
    RateLimiter,
    /// A [`Retry`].
    Retry,
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            PolicyKind::CircuitBreaker => "circuit_breaker",
            PolicyKind::RateLimiter => "rate_limiter",
            PolicyKind::Retry => "retry",
        };
        f.write_str(kind)
    }
}

/// One resolved policy.
#[derive(Clone, Debug)]
pub enum PolicyHandle {
    /// Circuit breaker.
    CircuitBreaker(Arc<dyn CircuitBreaker>),
    /// Rate limiter.
    RateLimiter(Arc<dyn RateLimiter>),
    /// Retry.
    Retry(Arc<dyn Retry>),
}

impl PolicyHandle {
    /// Name of the underlying policy.
    pub fn name(&self) -> &str {
        match self {
            PolicyHandle::CircuitBreaker(breaker) => breaker.name(),
            PolicyHandle::RateLimiter(limiter) => limiter.name(),
            PolicyHandle::Retry(retry) => retry.name(),
        }
    }

    /// Kind of the underlying policy.
    pub fn kind(&self) -> PolicyKind {
        match self {
            PolicyHandle::CircuitBreaker(_) => PolicyKind::CircuitBreaker,
            PolicyHandle::RateLimiter(_) => PolicyKind::RateLimiter,
            PolicyHandle::Retry(_) => PolicyKind::Retry,
        }
    }
}

type Table<P> = ArcSwap<HashMap<String, Arc<P>>>;

fn empty_table<P: ?Sized>() -> Table<P> {
    ArcSwap::from_pointee(HashMap::new())
}

fn insert<P: ?Sized>(table: &Table<P>, kind: PolicyKind, name: &str, policy: Arc<P>) {
    let previous = table.rcu(|current| {
        let mut next = HashMap::clone(current);
        next.insert(name.to_string(), Arc::clone(&policy));
        next
    });
    if previous.contains_key(name) {
        warn!(
            target: "shapeguard::registry",
            kind = %kind,
            name = %name,
            "policy name replaced; last registration wins"
        );
    }
}

fn sorted_names<P: ?Sized>(table: &Table<P>) -> Vec<String> {
    let mut names: Vec<String> = table.load().keys().cloned().collect();
    names.sort();
    names
}

/// Policies by kind and name.
pub struct PolicyRegistry {
    circuit_breakers: Table<dyn CircuitBreaker>,
    rate_limiters: Table<dyn RateLimiter>,
    retries: Table<dyn Retry>,
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self {
            circuit_breakers: empty_table(),
            rate_limiters: empty_table(),
            retries: empty_table(),
        }
    }
}

impl fmt::Debug for PolicyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyRegistry")
            .field("circuit_breakers", &sorted_names(&self.circuit_breakers))
            .field("rate_limiters", &sorted_names(&self.rate_limiters))
            .field("retries", &sorted_names(&self.retries))
            .finish()
    }
}

impl PolicyRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a circuit breaker under its own name.
    pub fn register_circuit_breaker(&self, breaker: Arc<dyn CircuitBreaker>) {
        let name = breaker.name().to_string();
        insert(&self.circuit_breakers, PolicyKind::CircuitBreaker, &name, breaker);
    }

    /// Register a rate limiter under its own name.
    pub fn register_rate_limiter(&self, limiter: Arc<dyn RateLimiter>) {
        let name = limiter.name().to_string();
        insert(&self.rate_limiters, PolicyKind::RateLimiter, &name, limiter);
    }

    /// Register a retry policy under its own name.
    pub fn register_retry(&self, retry: Arc<dyn Retry>) {
        let name = retry.name().to_string();
        insert(&self.retries, PolicyKind::Retry, &name, retry);
    }

    /// Register any policy handle.
    pub fn register(&self, handle: PolicyHandle) {
        match handle {
            PolicyHandle::CircuitBreaker(breaker) => self.register_circuit_breaker(breaker),
            PolicyHandle::RateLimiter(limiter) => self.register_rate_limiter(limiter),
            PolicyHandle::Retry(retry) => self.register_retry(retry),
        }
    }

    /// Circuit breaker registered as `name`.
    pub fn circuit_breaker(&self, name: &str) -> Option<Arc<dyn CircuitBreaker>> {
        self.circuit_breakers.load().get(name).cloned()
    }

    /// Rate limiter registered as `name`.
    pub fn rate_limiter(&self, name: &str) -> Option<Arc<dyn RateLimiter>> {
        self.rate_limiters.load().get(name).cloned()
    }

    /// Retry policy registered as `name`.
    pub fn retry(&self, name: &str) -> Option<Arc<dyn Retry>> {
        self.retries.load().get(name).cloned()
    }

    /// Resolve `(kind, name)` to a handle.
    pub fn resolve(&self, kind: PolicyKind, name: &str) -> Option<PolicyHandle> {
        match kind {
            PolicyKind::CircuitBreaker => self.circuit_breaker(name).map(PolicyHandle::CircuitBreaker),
            PolicyKind::RateLimiter => self.rate_limiter(name).map(PolicyHandle::RateLimiter),
            PolicyKind::Retry => self.retry(name).map(PolicyHandle::Retry),
        }
    }

    /// Registered names of one kind, sorted.
    pub fn names(&self, kind: PolicyKind) -> Vec<String> {
        match kind {
            PolicyKind::CircuitBreaker => sorted_names(&self.circuit_breakers),
            PolicyKind::RateLimiter => sorted_names(&self.rate_limiters),
            PolicyKind::Retry => sorted_names(&self.retries),
        }
    }
}
