//! Error types surfaced by guarded calls.
//!
//! Every unit of work speaks `ResilienceError<E>`: the operation's own failure travels as
//! [`ResilienceError::Inner`], and the policies add their own variants on top. Keeping a
//! single error domain lets transforms stack without nesting wrappers.
use std::fmt;

/// Unified error type for all guarded calls.
#[derive(Debug, Clone)]
pub enum ResilienceError<E> {
    /// The named circuit breaker did not permit the call.
    CircuitOpen {
        /// Name of the breaker that refused the call.
        name: String,
    },
    /// The named rate limiter had no permit available within its wait timeout.
    RequestNotPermitted {
        /// Name of the limiter that refused the call.
        name: String,
    },
    /// The wait for a rate limiter permit was interrupted. Never recovered, never retried.
    Interrupted {
        /// Name of the limiter whose wait was interrupted.
        name: String,
    },
    /// The source completed without emitting a value.
    Incomplete,
    /// The underlying operation failed
    Inner(E),
}

impl<E: fmt::Display> fmt::Display for ResilienceError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CircuitOpen { name } => write!(f, "circuit breaker '{}' is open", name),
            Self::RequestNotPermitted { name } => {
                write!(f, "request not permitted for rate limiter '{}'", name)
            }
            Self::Interrupted { name } => {
                write!(f, "interrupted while waiting for a permit from rate limiter '{}'", name)
            }
            Self::Incomplete => write!(f, "source completed without a value"),
            Self::Inner(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for ResilienceError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }
}

impl<E> ResilienceError<E> {
    /// Check if this error is a circuit breaker denial
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    /// Check if this error is a rate limiter denial
    pub fn is_not_permitted(&self) -> bool {
        matches!(self, Self::RequestNotPermitted { .. })
    }

    /// Check if the permit wait was interrupted
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted { .. })
    }

    /// Denials are synthesized by a policy refusing permission; they are always recoverable.
    pub fn is_denial(&self) -> bool {
        self.is_circuit_open() || self.is_not_permitted()
    }

    /// Fatal errors bypass recovery functions and retries.
    pub fn is_fatal(&self) -> bool {
        self.is_interrupted()
    }

    /// Check if the source completed without a value
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::Incomplete)
    }

    /// Check if this error wraps an inner error.
    pub fn is_inner(&self) -> bool {
        matches!(self, Self::Inner(_))
    }

    /// Name of the policy that synthesized this error, if any.
    pub fn policy_name(&self) -> Option<&str> {
        match self {
            Self::CircuitOpen { name }
            | Self::RequestNotPermitted { name }
            | Self::Interrupted { name } => Some(name),
            Self::Incomplete | Self::Inner(_) => None,
        }
    }

    /// Get the inner error if this is an Inner variant
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }

    /// Borrow the inner error if present.
    pub fn as_inner(&self) -> Option<&E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }

    /// Mutably borrow the inner error if present.
    pub fn as_inner_mut(&mut self) -> Option<&mut E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }
}

impl<E: std::error::Error + 'static> ResilienceError<E> {
    /// The error a policy hook should see: the operation's own error for
    /// [`Inner`](Self::Inner), otherwise this error itself.
    pub fn as_hook_error(&self) -> &(dyn std::error::Error + 'static) {
        match self {
            Self::Inner(e) => e,
            other => other,
        }
    }
}

impl<E> From<E> for ResilienceError<E> {
    fn from(e: E) -> Self {
        Self::Inner(e)
    }
}
