//! Restart policy for speech capture
//!
//! The policy is plain data; [`RetryPolicy::decide`] turns an error class and
//! the attempts made so far into a decision, so the caller never chains
//! timers by hand. Transient errors are retried for as long as the session
//! lasts: backoff grows over the budget, then holds at `max_delay`.

use std::time::{Duration, SystemTime};

use serde::Serialize;

/// Whether a capture error is worth retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorClass {
    /// Momentary condition; restarting capture is expected to work
    Transient,
    /// Permission or device problem; retrying cannot help
    Fatal,
}

/// Outcome of consulting the policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Restart after `delay`; `attempt` is 1-based
    Retry { attempt: u32, delay: Duration },
    /// Stop and report the error
    GiveUp,
}

/// Retry policy for capture restarts
///
/// Controls how many times a transient failure is retried and how long to
/// wait between attempts using exponential backoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Consecutive retries that back off exponentially; later ones wait
    /// `max_delay`
    pub max_retries: u32,
    /// Base delay between retries (doubles each attempt)
    pub base_delay: Duration,
    /// Maximum delay cap
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Decide what to do after a failure
    ///
    /// `attempts` is the number of retries already made since the last
    /// successful result. Fatal errors are never retried; transient ones
    /// always are.
    #[must_use]
    pub fn decide(&self, class: ErrorClass, attempts: u32) -> RetryDecision {
        let attempt = attempts.saturating_add(1);
        match class {
            ErrorClass::Fatal => RetryDecision::GiveUp,
            ErrorClass::Transient if attempts >= self.max_retries => RetryDecision::Retry {
                attempt,
                delay: self.max_delay,
            },
            ErrorClass::Transient => RetryDecision::Retry {
                attempt,
                delay: delay_for_attempt(self, attempts),
            },
        }
    }

    /// Whether `attempt` is past the backoff budget
    #[must_use]
    pub const fn is_exhausted(&self, attempt: u32) -> bool {
        attempt > self.max_retries
    }
}

/// Compute the delay before the next retry attempt.
///
/// Follows exponential backoff: `min(base_delay * 2^attempt + jitter,
/// max_delay)`. Jitter is 0-25% of the computed delay, derived from
/// `SystemTime` to avoid pulling in a full random number generator.
#[must_use]
pub fn delay_for_attempt(policy: &RetryPolicy, attempt: u32) -> Duration {
    let base = policy
        .base_delay
        .saturating_mul(2u32.saturating_pow(attempt));
    let base = base.min(policy.max_delay);

    // Derive a simple jitter from subsecond nanos of the system clock
    let jitter_nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();

    // Scale to 0-25% of the base delay
    let jitter_fraction = f64::from(jitter_nanos % 250) / 1000.0;
    let jitter = base.mul_f64(jitter_fraction);

    (base + jitter).min(policy.max_delay)
}
