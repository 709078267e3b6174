//! Outcome records handed to policy hooks.

use std::error::Error;
use std::time::{Duration, Instant};

/// Measures how long one attempt took, from permit to terminal signal.
#[derive(Debug, Clone, Copy)]
pub struct StopWatch {
    started: Instant,
}

impl StopWatch {
    /// Start measuring now.
    pub fn start() -> Self {
        Self { started: Instant::now() }
    }

    /// Time since [`StopWatch::start`].
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Terminal outcome of one attempt, as seen by a policy.
#[derive(Debug, Clone, Copy)]
pub enum Outcome<'a> {
    /// The attempt produced a value.
    Success {
        /// Time from permit to value.
        elapsed: Duration,
    },
    /// The attempt failed.
    Failure {
        /// Time from permit to failure.
        elapsed: Duration,
        /// The failure, as reported upstream.
        error: &'a (dyn Error + 'static),
    },
}

impl Outcome<'_> {
    /// Duration of the attempt.
    pub fn elapsed(&self) -> Duration {
        match self {
            Outcome::Success { elapsed } | Outcome::Failure { elapsed, .. } => *elapsed,
        }
    }

    /// Whether the attempt produced a value.
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn outcome_exposes_elapsed_for_both_variants() {
        let err = io::Error::new(io::ErrorKind::Other, "x");
        let ok = Outcome::Success { elapsed: Duration::from_millis(3) };
        let failed = Outcome::Failure { elapsed: Duration::from_millis(7), error: &err };
        assert!(ok.is_success());
        assert!(!failed.is_success());
        assert_eq!(ok.elapsed(), Duration::from_millis(3));
        assert_eq!(failed.elapsed(), Duration::from_millis(7));
    }

    #[test]
    fn stopwatch_measures_forward() {
        let watch = StopWatch::start();
        std::thread::sleep(Duration::from_millis(2));
        assert!(watch.elapsed() >= Duration::from_millis(2));
    }
}
