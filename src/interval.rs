//! Wait intervals between retry attempts.
//!
//! Attempt semantics: `delay(1)` is the wait after the first failure, `delay(2)` after the
//! second, and so on. `delay(0)` is always zero. Computations that would overflow saturate
//! to [`MAX_INTERVAL`].
//!
//! Example
//! ```rust
//! use std::time::Duration;
//! use shapeguard::IntervalFn;
//!
//! let interval = IntervalFn::exponential(Duration::from_millis(100), 2.0)
//!     .unwrap()
//!     .with_max(Duration::from_secs(1))
//!     .unwrap();
//! assert_eq!(interval.delay(1), Duration::from_millis(100));
//! assert_eq!(interval.delay(2), Duration::from_millis(200));
//! assert_eq!(interval.delay(8), Duration::from_secs(1)); // capped
//! ```

use rand::{rng, Rng};
use std::time::Duration;

/// Longest wait any interval function will produce (1 day).
pub const MAX_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Errors returned when configuring an interval function.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IntervalError {
    /// Exponential growth needs a multiplier of at least 1.0.
    #[error("multiplier must be >= 1.0 (got {0})")]
    InvalidMultiplier(f64),
    /// Randomization factor must lie in `[0.0, 1.0)`.
    #[error("randomization factor must be in [0.0, 1.0) (got {0})")]
    InvalidRandomizationFactor(f64),
    /// Cap must not undercut the initial wait.
    #[error("max ({max:?}) must be >= initial ({initial:?})")]
    MaxLessThanInitial {
        /// Initial wait.
        initial: Duration,
        /// Requested cap.
        max: Duration,
    },
    /// Only exponential intervals accept a cap.
    #[error("with_max is only valid for exponential intervals")]
    MaxNotSupported,
}

/// How long to wait before the next attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum IntervalFn {
    /// Retry immediately.
    None,
    /// Wait the same duration before each retry.
    Fixed(Duration),
    /// `initial * multiplier^(attempt - 1)`, capped at `max`.
    Exponential {
        /// Wait before the first retry.
        initial: Duration,
        /// Growth per attempt.
        multiplier: f64,
        /// Upper bound.
        max: Duration,
    },
    /// Uniform in `[base * (1 - factor), base * (1 + factor)]`.
    Randomized {
        /// Centre of the range.
        base: Duration,
        /// Relative spread.
        factor: f64,
    },
}

impl Default for IntervalFn {
    fn default() -> Self {
        IntervalFn::Fixed(Duration::from_millis(500))
    }
}

impl IntervalFn {
    /// No wait between attempts.
    pub fn none() -> Self {
        IntervalFn::None
    }

    /// Constant wait between attempts.
    pub fn fixed(wait: Duration) -> Self {
        if wait.is_zero() {
            IntervalFn::None
        } else {
            IntervalFn::Fixed(wait.min(MAX_INTERVAL))
        }
    }

    /// Exponentially growing wait.
    pub fn exponential(initial: Duration, multiplier: f64) -> Result<Self, IntervalError> {
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(IntervalError::InvalidMultiplier(multiplier));
        }
        Ok(IntervalFn::Exponential { initial, multiplier, max: MAX_INTERVAL })
    }

    /// Randomized wait around `base`.
    pub fn randomized(base: Duration, factor: f64) -> Result<Self, IntervalError> {
        if !(0.0..1.0).contains(&factor) {
            return Err(IntervalError::InvalidRandomizationFactor(factor));
        }
        Ok(IntervalFn::Randomized { base, factor })
    }

    /// Cap an exponential interval.
    pub fn with_max(self, cap: Duration) -> Result<Self, IntervalError> {
        match self {
            IntervalFn::Exponential { initial, multiplier, .. } => {
                if cap < initial {
                    return Err(IntervalError::MaxLessThanInitial { initial, max: cap });
                }
                Ok(IntervalFn::Exponential { initial, multiplier, max: cap.min(MAX_INTERVAL) })
            }
            _ => Err(IntervalError::MaxNotSupported),
        }
    }

    /// Wait before retry number `attempt` (1-indexed).
    pub fn delay(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        match self {
            IntervalFn::None => Duration::ZERO,
            IntervalFn::Fixed(wait) => *wait,
            IntervalFn::Exponential { initial, multiplier, max } => {
                let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
                let secs = initial.as_secs_f64() * multiplier.powi(exponent);
                if !secs.is_finite() || secs >= max.as_secs_f64() {
                    *max
                } else {
                    Duration::from_secs_f64(secs)
                }
            }
            IntervalFn::Randomized { base, factor } => {
                let centre = base.as_secs_f64();
                let low = centre * (1.0 - factor);
                let high = centre * (1.0 + factor);
                if high <= low {
                    return *base;
                }
                let secs = rng().random_range(low..=high);
                Duration::from_secs_f64(secs.min(MAX_INTERVAL.as_secs_f64()))
            }
        }
    }
}
