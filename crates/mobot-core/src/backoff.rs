//! Bounded exponential backoff.
//!
//! One policy type shared by every polling loop in the crate: the Android
//! UI-dump retry, the simulator agent start-up poll and the wait engine.
//! Each call site picks its own parameters.

use std::time::Duration;

/// Retry schedule: attempt count, first delay, growth factor and cap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// Total number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub initial_delay: Duration,
    /// Factor applied to the delay after every round.
    pub multiplier: f64,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl BackoffPolicy {
    /// Android UI-tree dump: 3 attempts, 50 ms → 100 ms → 200 ms.
    pub const UI_DUMP: BackoffPolicy = BackoffPolicy {
        max_attempts: 3,
        initial_delay: Duration::from_millis(50),
        multiplier: 2.0,
        max_delay: Duration::from_millis(200),
    };

    /// A fixed-interval poll that never gives up on its own; the caller owns
    /// the deadline.
    pub fn fixed(interval: Duration) -> Self {
        Self {
            max_attempts: u32::MAX,
            initial_delay: interval,
            multiplier: 1.0,
            max_delay: interval,
        }
    }

    /// A growing poll that never gives up on its own; the caller owns the
    /// deadline.
    pub fn polling(initial: Duration, multiplier: f64, max: Duration) -> Self {
        Self {
            max_attempts: u32::MAX,
            initial_delay: initial.min(max),
            multiplier,
            max_delay: max,
        }
    }

    /// Delay to wait after the `retry`-th failure (zero-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(retry.min(i32::MAX as u32) as i32);
        let millis = self.initial_delay.as_secs_f64() * 1000.0 * factor;
        let capped = millis.min(self.max_delay.as_secs_f64() * 1000.0);
        Duration::from_micros((capped * 1000.0) as u64)
    }

    /// Returns `true` if another attempt may follow attempt number `attempt`
    /// (one-based).
    pub fn allows_retry_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Iterator over successive delays; yields one fewer item than
    /// `max_attempts`.
    pub fn delays(&self) -> Delays {
        Delays {
            policy: *self,
            next: 0,
        }
    }
}

/// Iterator returned by [`BackoffPolicy::delays`].
#[derive(Debug, Clone)]
pub struct Delays {
    policy: BackoffPolicy,
    next: u32,
}

impl Iterator for Delays {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.next + 1 >= self.policy.max_attempts {
            return None;
        }
        let delay = self.policy.delay_for(self.next);
        self.next += 1;
        Some(delay)
    }
}
