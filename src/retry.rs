//! Reconnect scheduling
//!
//! The connection manager never sleeps on the caller's thread; it asks a
//! [`Backoff`] when the next attempt is due and checks that on each tick.

use std::time::{Duration, Instant};

/// Configuration for reconnect attempts
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of consecutive failed attempts, `None` for unbounded
    pub max_attempts: Option<u32>,
    /// Delay after the first failure, in milliseconds
    pub initial_delay_ms: u64,
    /// Upper bound on the delay, in milliseconds
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff (typically 2.0)
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: None,
            initial_delay_ms: 500,
            max_delay_ms: 60_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn new(
        max_attempts: Option<u32>,
        initial_delay_ms: u64,
        max_delay_ms: u64,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_attempts,
            initial_delay_ms,
            max_delay_ms,
            backoff_multiplier,
        }
    }

    /// Default delays, capped at `max_attempts` consecutive failures
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            ..Default::default()
        }
    }

    /// Calculate the delay after failure number `attempt` (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay = (self.initial_delay_ms as f64) * self.backoff_multiplier.powi(exponent);
        let delay_ms = delay.min(self.max_delay_ms as f64) as u64;
        Duration::from_millis(delay_ms)
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if self.max_attempts == Some(0) {
            return Err("max_attempts must be greater than 0");
        }
        if self.backoff_multiplier < 1.0 {
            return Err("backoff_multiplier must be at least 1.0");
        }
        if self.initial_delay_ms > self.max_delay_ms {
            return Err("initial_delay_ms exceeds max_delay_ms");
        }
        Ok(())
    }
}

/// Tracks consecutive failures and when the next attempt is due
#[derive(Debug, Clone)]
pub struct Backoff {
    config: RetryConfig,
    failures: u32,
    next_attempt: Option<Instant>,
}

impl Backoff {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            failures: 0,
            next_attempt: None,
        }
    }

    /// Whether an attempt may be made at `now`
    pub fn is_due(&self, now: Instant) -> bool {
        !self.is_exhausted() && self.next_attempt.map_or(true, |at| now >= at)
    }

    /// Record a failed attempt and schedule the next one
    pub fn record_failure(&mut self, now: Instant) -> Duration {
        let delay = self.config.delay_for_attempt(self.failures);
        self.failures = self.failures.saturating_add(1);
        self.next_attempt = Some(now + delay);
        log::trace!(
            "Attempt {} failed, next in {:?}",
            self.failures,
            delay
        );
        delay
    }

    /// Schedule an attempt after the initial delay without counting a failure
    pub fn schedule_after_drop(&mut self, now: Instant) {
        self.next_attempt = Some(now + self.config.delay_for_attempt(0));
    }

    pub fn reset(&mut self) {
        self.failures = 0;
        self.next_attempt = None;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn is_exhausted(&self) -> bool {
        self.config
            .max_attempts
            .is_some_and(|max| self.failures >= max)
    }
}
