//! Fallback values for failed or denied calls.

use crate::ResilienceError;
use std::fmt;
use std::sync::Arc;

type RecoverFn<T, E> = dyn Fn(ResilienceError<E>) -> Result<T, ResilienceError<E>> + Send + Sync;

/// Maps a failure to a substitute value, or to a different failure.
///
/// A recovery is consulted at most once per call. Whatever it returns is final: an error it
/// produces is delivered as the call's failure and never recovered again. Fatal errors (see
/// [`ResilienceError::is_fatal`]) bypass the recovery entirely.
///
/// # Examples
/// ```
/// use shapeguard::{Recovery, ResilienceError};
/// let fallback = Recovery::<&str, std::io::Error>::value("fallback");
/// let out = fallback.recover(ResilienceError::CircuitOpen { name: "api".into() });
/// assert_eq!(out.unwrap(), "fallback");
/// ```
pub struct Recovery<T, E> {
    f: Arc<RecoverFn<T, E>>,
}

impl<T, E> Clone for Recovery<T, E> {
    fn clone(&self) -> Self {
        Self { f: Arc::clone(&self.f) }
    }
}

impl<T, E> fmt::Debug for Recovery<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recovery").finish_non_exhaustive()
    }
}

impl<T, E> Recovery<T, E> {
    /// Recover with an arbitrary function.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(ResilienceError<E>) -> Result<T, ResilienceError<E>> + Send + Sync + 'static,
    {
        Self { f: Arc::new(f) }
    }

    /// Substitute a fixed value for any recoverable failure.
    pub fn value(value: T) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        Self::new(move |_| Ok(value.clone()))
    }

    /// Substitute `T::default()` for any recoverable failure.
    pub fn default_value() -> Self
    where
        T: Default,
    {
        Self::new(|_| Ok(T::default()))
    }

    /// Apply the recovery to `err`.
    pub fn recover(&self, err: ResilienceError<E>) -> Result<T, ResilienceError<E>> {
        if err.is_fatal() {
            return Err(err);
        }
        (self.f)(err)
    }
}

pub(crate) fn recover_or_propagate<T, E>(
    recovery: Option<&Recovery<T, E>>,
    err: ResilienceError<E>,
) -> Result<T, ResilienceError<E>> {
    match recovery {
        Some(recovery) => recovery.recover(err),
        None => Err(err),
    }
}
