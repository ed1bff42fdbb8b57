//! Reconnect policy: capped exponential backoff with an attempt ceiling.
//!
//! DESIGN
//! ======
//! `ReconnectPolicy` is fixed configuration; `ReconnectState` is the mutable
//! counter owned by the connection manager. Only unexpected closes advance the
//! counter, and only a successful registration resets it.

use std::time::Duration;

pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 10;
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);
pub const DEFAULT_BACKOFF_CAP: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Unplanned closes tolerated before giving up for good.
    pub max_attempts: u32,
    /// Delay unit; attempt `n` waits `base_delay * 2^n`.
    pub base_delay: Duration,
    /// Upper bound on any single wait.
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            base_delay: DEFAULT_BACKOFF_BASE,
            max_delay: DEFAULT_BACKOFF_CAP,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt`: `min(base * 2^attempt, cap)`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        2_u32
            .checked_pow(attempt)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

/// Attempt counter driven by the connection task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconnectState {
    attempts: u32,
}

impl ReconnectState {
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Record an unplanned close and return how long to wait before the next
    /// attempt, or `None` once the policy's ceiling has been reached.
    pub fn next_delay(&mut self, policy: &ReconnectPolicy) -> Option<Duration> {
        if self.attempts >= policy.max_attempts {
            return None;
        }
        self.attempts += 1;
        Some(policy.delay_for(self.attempts))
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}

#[cfg(test)]
#[path = "backoff_test.rs"]
mod tests;
