//! Declarative policy configuration.
//!
//! A [`ResilienceConfig`] names every policy an application uses, with millisecond durations,
//! and builds a ready [`PolicyRegistry`] from them. Missing fields take the defaults documented
//! on each settings type; unknown fields are rejected.
//!
//! ```
//! use shapeguard::{PolicyKind, ResilienceConfig};
//!
//! let config = ResilienceConfig::from_json_str(r#"{
//!     "circuit_breakers": { "inventory": { "failure_threshold": 3 } },
//!     "retries": { "pricing": { "max_attempts": 4, "wait_ms": 100, "multiplier": 2.0 } }
//! }"#).unwrap();
//!
//! let registry = config.build_registry().unwrap();
//! assert_eq!(registry.names(PolicyKind::CircuitBreaker), vec!["inventory".to_string()]);
//! assert!(registry.retry("pricing").is_some());
//! ```

use crate::circuit_breaker::{CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerPolicy};
use crate::interval::{IntervalError, IntervalFn};
use crate::rate_limiter::{RateLimiterConfig, RateLimiterConfigError, RateLimiterPolicy};
use crate::registry::PolicyRegistry;
use crate::retry::{BuildError, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Errors raised while loading configuration or building policies from it.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The document is not valid configuration.
    #[error("invalid resilience config: {0}")]
    Parse(#[from] serde_json::Error),
    /// A circuit breaker entry is invalid.
    #[error("circuit breaker '{name}': {source}")]
    CircuitBreaker {
        /// Entry name.
        name: String,
        /// Validation failure.
        #[source]
        source: CircuitBreakerError,
    },
    /// A rate limiter entry is invalid.
    #[error("rate limiter '{name}': {source}")]
    RateLimiter {
        /// Entry name.
        name: String,
        /// Validation failure.
        #[source]
        source: RateLimiterConfigError,
    },
    /// A retry entry is invalid.
    #[error("retry '{name}': {source}")]
    Retry {
        /// Entry name.
        name: String,
        /// Validation failure.
        #[source]
        source: BuildError,
    },
    /// A retry entry has an invalid wait interval.
    #[error("retry '{name}' interval: {source}")]
    Interval {
        /// Entry name.
        name: String,
        /// Validation failure.
        #[source]
        source: IntervalError,
    },
    /// A retry entry sets both `multiplier` and `randomization_factor`.
    #[error("retry '{name}': multiplier and randomization_factor are mutually exclusive")]
    ConflictingInterval {
        /// Entry name.
        name: String,
    },
}

/// All named policies of an application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResilienceConfig {
    /// Circuit breakers by name.
    pub circuit_breakers: BTreeMap<String, CircuitBreakerSettings>,
    /// Rate limiters by name.
    pub rate_limiters: BTreeMap<String, RateLimiterSettings>,
    /// Retry policies by name.
    pub retries: BTreeMap<String, RetrySettings>,
}

/// Circuit breaker entry. Defaults: 5 failures, 60s open, 1 half-open trial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CircuitBreakerSettings {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: usize,
    /// How long the circuit stays open before probing.
    pub wait_in_open_ms: u64,
    /// Concurrent trials while half-open.
    pub half_open_max_calls: usize,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self { failure_threshold: 5, wait_in_open_ms: 60_000, half_open_max_calls: 1 }
    }
}

/// Rate limiter entry. Defaults: 50 permits per 500ms, 5s wait.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimiterSettings {
    /// Permits per window.
    pub limit_for_period: u32,
    /// Window length.
    pub limit_refresh_period_ms: u64,
    /// Longest wait for a permit.
    pub timeout_ms: u64,
}

impl Default for RateLimiterSettings {
    fn default() -> Self {
        Self { limit_for_period: 50, limit_refresh_period_ms: 500, timeout_ms: 5_000 }
    }
}

/// Retry entry. Defaults: 3 attempts, fixed 500ms wait.
///
/// `multiplier` makes the wait exponential (optionally capped by `max_wait_ms`);
/// `randomization_factor` spreads it uniformly around `wait_ms`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    /// Total attempts per call.
    pub max_attempts: usize,
    /// Base wait between attempts.
    pub wait_ms: u64,
    /// Exponential growth factor.
    pub multiplier: Option<f64>,
    /// Cap for exponential waits.
    pub max_wait_ms: Option<u64>,
    /// Relative spread for randomized waits.
    pub randomization_factor: Option<f64>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            wait_ms: 500,
            multiplier: None,
            max_wait_ms: None,
            randomization_factor: None,
        }
    }
}

impl RetrySettings {
    fn interval(&self, name: &str) -> Result<IntervalFn, ConfigError> {
        let wait = Duration::from_millis(self.wait_ms);
        let interval_error = |source: IntervalError| ConfigError::Interval { name: name.to_string(), source };

        let interval = match (self.multiplier, self.randomization_factor) {
            (Some(_), Some(_)) => {
                return Err(ConfigError::ConflictingInterval { name: name.to_string() })
            }
            (Some(multiplier), None) => {
                IntervalFn::exponential(wait, multiplier).map_err(interval_error)?
            }
            (None, Some(factor)) => IntervalFn::randomized(wait, factor).map_err(interval_error)?,
            (None, None) => IntervalFn::fixed(wait),
        };

        match self.max_wait_ms {
            Some(max) => interval.with_max(Duration::from_millis(max)).map_err(interval_error),
            None => Ok(interval),
        }
    }
}

impl ResilienceConfig {
    /// Parse a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Build every configured policy into a fresh registry.
    pub fn build_registry(&self) -> Result<PolicyRegistry, ConfigError> {
        let registry = PolicyRegistry::new();

        for (name, settings) in &self.circuit_breakers {
            let config = CircuitBreakerConfig::new(
                settings.failure_threshold,
                Duration::from_millis(settings.wait_in_open_ms),
                settings.half_open_max_calls,
            )
            .map_err(|source| ConfigError::CircuitBreaker { name: name.clone(), source })?;
            registry.register_circuit_breaker(Arc::new(CircuitBreakerPolicy::with_config(
                name.as_str(),
                config,
            )));
        }

        for (name, settings) in &self.rate_limiters {
            let config = RateLimiterConfig::new(
                settings.limit_for_period,
                Duration::from_millis(settings.limit_refresh_period_ms),
                Duration::from_millis(settings.timeout_ms),
            )
            .map_err(|source| ConfigError::RateLimiter { name: name.clone(), source })?;
            registry.register_rate_limiter(Arc::new(RateLimiterPolicy::new(name.as_str(), config)));
        }

        for (name, settings) in &self.retries {
            let policy = RetryPolicy::builder(name.as_str())
                .max_attempts(settings.max_attempts)
                .interval(settings.interval(name)?)
                .build()
                .map_err(|source| ConfigError::Retry { name: name.clone(), source })?;
            registry.register_retry(Arc::new(policy));
        }

        tracing::debug!(
            circuit_breakers = self.circuit_breakers.len(),
            rate_limiters = self.rate_limiters.len(),
            retries = self.retries.len(),
            "Built policy registry from config"
        );
        Ok(registry)
    }
}
