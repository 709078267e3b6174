//! Rate limiter interface and a fixed-window reference implementation.
//!
//! Guarded calls ask a [`RateLimiter`] for one permit, willing to block for up to
//! [`RateLimiter::timeout`]. [`RateLimiterPolicy`] hands out `limit_for_period` permits per
//! refresh window; callers that find the window exhausted wait for the next one if it begins
//! before their deadline, and give up immediately otherwise.

use crate::clock::{Clock, MonotonicClock};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

/// A blocked permit wait was aborted before it could finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("wait for a rate limiter permit was interrupted")]
pub struct WaitInterrupted;

/// Permit surface of a named rate limiter.
pub trait RateLimiter: Send + Sync + fmt::Debug {
    /// Name the limiter is registered under.
    fn name(&self) -> &str;

    /// Longest a caller is willing to wait for a permit.
    fn timeout(&self) -> Duration;

    /// Acquire one permit, blocking for at most `timeout`.
    ///
    /// `Ok(false)` means no permit became available in time.
    fn get_permission(&self, timeout: Duration) -> Result<bool, WaitInterrupted>;
}

/// Errors produced when validating limiter configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimiterConfigError {
    /// At least one permit per period is required.
    #[error("limit_for_period must be > 0")]
    InvalidLimit,
    /// The refresh period must be at least one millisecond.
    #[error("limit_refresh_period must be >= 1ms (got {0:?})")]
    InvalidRefreshPeriod(Duration),
}

/// Validated configuration for [`RateLimiterPolicy`].
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    limit_for_period: u32,
    limit_refresh_period: Duration,
    timeout: Duration,
}

impl RateLimiterConfig {
    /// Create a config with validation.
    pub fn new(
        limit_for_period: u32,
        limit_refresh_period: Duration,
        timeout: Duration,
    ) -> Result<Self, RateLimiterConfigError> {
        if limit_for_period == 0 {
            return Err(RateLimiterConfigError::InvalidLimit);
        }
        if limit_refresh_period < Duration::from_millis(1) {
            return Err(RateLimiterConfigError::InvalidRefreshPeriod(limit_refresh_period));
        }
        Ok(Self { limit_for_period, limit_refresh_period, timeout })
    }

    /// Permits handed out per window.
    pub fn limit_for_period(&self) -> u32 {
        self.limit_for_period
    }

    /// Window length.
    pub fn limit_refresh_period(&self) -> Duration {
        self.limit_refresh_period
    }

    /// Default permit wait.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn period_millis(&self) -> u64 {
        u64::try_from(self.limit_refresh_period.as_millis()).unwrap_or(u64::MAX)
    }
}

#[derive(Debug)]
struct Cycle {
    index: u64,
    permits: u32,
}

#[derive(Debug)]
struct LimiterState {
    cycle: Mutex<Cycle>,
    refreshed: Condvar,
    interrupts: AtomicU64,
}

/// Fixed-window permit limiter.
///
/// Clones share the same permits.
#[derive(Debug, Clone)]
pub struct RateLimiterPolicy {
    name: Arc<str>,
    config: RateLimiterConfig,
    state: Arc<LimiterState>,
    clock: Arc<dyn Clock>,
}

impl RateLimiterPolicy {
    /// Create a limiter from a validated config.
    pub fn new(name: impl Into<String>, config: RateLimiterConfig) -> Self {
        let permits = config.limit_for_period;
        Self {
            name: Arc::from(name.into()),
            config,
            state: Arc::new(LimiterState {
                cycle: Mutex::new(Cycle { index: 0, permits }),
                refreshed: Condvar::new(),
                interrupts: AtomicU64::new(0),
            }),
            clock: Arc::new(MonotonicClock::default()),
        }
    }

    /// Override the clock (useful for deterministic tests).
    ///
    /// The current window is re-anchored on the new clock.
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        let index = clock.now_millis() / self.config.period_millis();
        {
            let mut cycle = self.state.cycle.lock().unwrap_or_else(PoisonError::into_inner);
            cycle.index = index;
            cycle.permits = self.config.limit_for_period;
        }
        self.clock = Arc::new(clock);
        self
    }

    /// Configuration in effect.
    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Permits left in the current window.
    pub fn available_permits(&self) -> u32 {
        let mut cycle = self.state.cycle.lock().unwrap_or_else(PoisonError::into_inner);
        self.refresh(&mut cycle, self.clock.now_millis());
        cycle.permits
    }

    /// Wake every blocked [`get_permission`](RateLimiter::get_permission) call with
    /// [`WaitInterrupted`].
    pub fn interrupt_waiters(&self) {
        let _cycle = self.state.cycle.lock().unwrap_or_else(PoisonError::into_inner);
        self.state.interrupts.fetch_add(1, Ordering::AcqRel);
        self.state.refreshed.notify_all();
        tracing::warn!(limiter = %self.name, "Rate limiter waiters interrupted");
    }

    fn refresh(&self, cycle: &mut Cycle, now: u64) {
        let index = now / self.config.period_millis();
        if index > cycle.index {
            cycle.index = index;
            cycle.permits = self.config.limit_for_period;
        }
    }
}

impl RateLimiter for RateLimiterPolicy {
    fn name(&self) -> &str {
        &self.name
    }

    fn timeout(&self) -> Duration {
        self.config.timeout
    }

    fn get_permission(&self, timeout: Duration) -> Result<bool, WaitInterrupted> {
        let generation = self.state.interrupts.load(Ordering::Acquire);
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        let deadline = self.clock.now_millis().saturating_add(timeout_ms);
        let period = self.config.period_millis();

        let mut cycle = self.state.cycle.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if self.state.interrupts.load(Ordering::Acquire) != generation {
                return Err(WaitInterrupted);
            }

            let now = self.clock.now_millis();
            self.refresh(&mut cycle, now);
            if cycle.permits > 0 {
                cycle.permits -= 1;
                return Ok(true);
            }

            let next_cycle = cycle.index.saturating_add(1).saturating_mul(period);
            if next_cycle > deadline {
                tracing::debug!(
                    limiter = %self.name,
                    ?timeout,
                    "Rate limiter: no permit before deadline"
                );
                return Ok(false);
            }

            let wait = Duration::from_millis(next_cycle.saturating_sub(now).max(1));
            cycle = self
                .state
                .refreshed
                .wait_timeout(cycle, wait)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::time::Instant;

    fn limiter(limit: u32, period_ms: u64, timeout: Duration) -> RateLimiterPolicy {
        let config =
            RateLimiterConfig::new(limit, Duration::from_millis(period_ms), timeout).expect("config");
        RateLimiterPolicy::new("api", config)
    }

    #[test]
    fn rejects_invalid_config() {
        assert_eq!(
            RateLimiterConfig::new(0, Duration::from_secs(1), Duration::ZERO).unwrap_err(),
            RateLimiterConfigError::InvalidLimit
        );
        assert!(matches!(
            RateLimiterConfig::new(1, Duration::ZERO, Duration::ZERO),
            Err(RateLimiterConfigError::InvalidRefreshPeriod(_))
        ));
    }

    #[test]
    fn hands_out_limit_per_window() {
        let clock = ManualClock::new();
        let limiter = limiter(2, 1_000, Duration::ZERO).with_clock(clock.clone());

        assert_eq!(limiter.get_permission(Duration::ZERO), Ok(true));
        assert_eq!(limiter.get_permission(Duration::ZERO), Ok(true));
        assert_eq!(limiter.get_permission(Duration::ZERO), Ok(false));
        assert_eq!(limiter.available_permits(), 0);

        clock.advance(1_000);
        assert_eq!(limiter.available_permits(), 2);
        assert_eq!(limiter.get_permission(Duration::ZERO), Ok(true));
    }

    #[test]
    fn gives_up_immediately_when_next_window_is_past_deadline() {
        let clock = ManualClock::new();
        let limiter = limiter(1, 10_000, Duration::from_millis(50)).with_clock(clock);
        assert_eq!(limiter.get_permission(limiter.timeout()), Ok(true));

        let start = Instant::now();
        assert_eq!(limiter.get_permission(limiter.timeout()), Ok(false));
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn waits_for_next_window_within_timeout() {
        let limiter = limiter(1, 30, Duration::from_millis(500));
        assert_eq!(limiter.get_permission(limiter.timeout()), Ok(true));
        assert_eq!(limiter.get_permission(limiter.timeout()), Ok(true));
    }

    #[test]
    fn interrupt_wakes_blocked_waiters() {
        let clock = ManualClock::new();
        let limiter = limiter(1, 60_000, Duration::from_secs(120)).with_clock(clock);
        assert_eq!(limiter.get_permission(Duration::ZERO), Ok(true));

        let waiter = {
            let limiter = limiter.clone();
            std::thread::spawn(move || limiter.get_permission(Duration::from_secs(120)))
        };
        while !waiter.is_finished() {
            std::thread::sleep(Duration::from_millis(10));
            limiter.interrupt_waiters();
        }

        assert_eq!(waiter.join().unwrap(), Err(WaitInterrupted));
    }

    #[test]
    fn clones_share_permits() {
        let limiter = limiter(1, 60_000, Duration::ZERO).with_clock(ManualClock::new());
        let other = limiter.clone();
        assert_eq!(limiter.get_permission(Duration::ZERO), Ok(true));
        assert_eq!(other.get_permission(Duration::ZERO), Ok(false));
    }
}
