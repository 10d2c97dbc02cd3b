//! Reconnect Backoff
//!
//! Exponential backoff with jitter between push reconnect attempts. The
//! delay for attempt `n` (zero-based) is `initial * multiplier^n`, capped
//! at `max_delay`, then spread by up to ±`jitter_factor`.

use std::time::Duration;

use rand::Rng;

/// Backoff tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnect.
    pub initial_delay: Duration,
    /// Upper bound of the un-jittered delay.
    pub max_delay: Duration,
    /// Growth factor per attempt.
    pub multiplier: f64,
    /// Fraction of the delay used as jitter range.
    pub jitter_factor: f64,
    /// Attempts before giving up (0 = never give up).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.2,
            max_attempts: 0,
        }
    }
}

/// Reconnect attempt tracker.
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempts: u32,
}

impl ReconnectPolicy {
    /// Create a tracker with no attempts recorded.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempts: 0,
        }
    }

    /// Delay before the next attempt, or `None` once attempts are
    /// exhausted.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.config.max_attempts != 0 && self.attempts >= self.config.max_attempts {
            return None;
        }
        let base = self.base_delay(self.attempts);
        self.attempts = self.attempts.saturating_add(1);
        Some(self.jitter(base))
    }

    /// Forget past attempts after a connection succeeded.
    pub const fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Attempts since the last reset.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Configured attempt limit.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let factor = self.config.multiplier.max(1.0).powi(exponent);
        #[allow(clippy::cast_precision_loss)]
        let millis = (self.config.initial_delay.as_millis() as f64 * factor).round();
        #[allow(clippy::cast_precision_loss)]
        let cap = self.config.max_delay.as_millis() as f64;

        if millis.is_finite() && millis < cap {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let millis = millis as u64;
            Duration::from_millis(millis)
        } else {
            self.config.max_delay
        }
    }

    fn jitter(&self, base: Duration) -> Duration {
        let factor = self.config.jitter_factor.clamp(0.0, 1.0);
        if factor == 0.0 || base.is_zero() {
            return base;
        }
        let spread = rand::rng().random_range(-factor..=factor);
        base.mul_f64(1.0 + spread).max(Duration::from_millis(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exact(initial_ms: u64, max_ms: u64, max_attempts: u32) -> ReconnectPolicy {
        ReconnectPolicy::new(ReconnectConfig {
            initial_delay: Duration::from_millis(initial_ms),
            max_delay: Duration::from_millis(max_ms),
            multiplier: 2.0,
            jitter_factor: 0.0,
            max_attempts,
        })
    }

    #[test]
    fn delays_double_up_to_cap() {
        let mut policy = exact(250, 1_500, 0);
        let delays: Vec<_> = (0..5).map(|_| policy.next_delay().unwrap()).collect();
        assert_eq!(
            delays,
            [250, 500, 1_000, 1_500, 1_500].map(Duration::from_millis)
        );
    }

    #[test]
    fn gives_up_after_max_attempts_until_reset() {
        let mut policy = exact(10, 100, 2);
        assert!(policy.next_delay().is_some());
        assert!(policy.next_delay().is_some());
        assert!(policy.next_delay().is_none());

        policy.reset();
        assert_eq!(policy.attempts(), 0);
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(10)));
    }

    #[test]
    fn jitter_stays_within_band() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig {
            initial_delay: Duration::from_millis(1_000),
            jitter_factor: 0.2,
            ..ReconnectConfig::default()
        });
        let delay = policy.next_delay().unwrap();
        assert!(delay >= Duration::from_millis(799) && delay <= Duration::from_millis(1_201));
    }
}
