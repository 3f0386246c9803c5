//! Retry policy for interrupted transfers.
//!
//! Unattended installs favour eventual completion, so the default policy
//! never gives up on transient failures. It does back off exponentially, and
//! callers that prefer a failure signal can cap the number of attempts.

use std::time::Duration;

/// Default initial delay for exponential backoff (250ms).
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 250;

/// Default maximum delay for exponential backoff (30 seconds).
pub const DEFAULT_MAX_DELAY_SECS: u64 = 30;

/// Default multiplier for exponential backoff.
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// How a transfer handles transient failures.
#[derive(Clone, Debug, PartialEq)]
pub enum RetryPolicy {
    /// No retries - fail on the first transient error.
    None,

    /// Constant delay between attempts.
    Fixed {
        /// Maximum number of attempts including the first, `None` for no limit.
        max_attempts: Option<u32>,
        /// Delay between attempts.
        delay: Duration,
    },

    /// Delay multiplied after each failure, up to a cap.
    ExponentialBackoff {
        /// Maximum number of attempts including the first, `None` for no limit.
        max_attempts: Option<u32>,
        /// Delay after the first failure.
        initial_delay: Duration,
        /// Delay cap.
        max_delay: Duration,
        /// Multiplier applied after each failure.
        multiplier: f64,
    },
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::ExponentialBackoff {
            max_attempts: None,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            max_delay: Duration::from_secs(DEFAULT_MAX_DELAY_SECS),
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff with default delays and the given attempt cap.
    pub fn exponential(max_attempts: Option<u32>) -> Self {
        Self::ExponentialBackoff {
            max_attempts,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            max_delay: Duration::from_secs(DEFAULT_MAX_DELAY_SECS),
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }

    /// Constant-delay policy.
    pub fn fixed(max_attempts: Option<u32>, delay: Duration) -> Self {
        Self::Fixed {
            max_attempts,
            delay,
        }
    }

    /// Delay before the next attempt after `failures` consecutive failures,
    /// or `None` once the policy is exhausted.
    pub fn delay_for_attempt(&self, failures: u32) -> Option<Duration> {
        match self {
            Self::None => None,
            Self::Fixed {
                max_attempts,
                delay,
            } => allows(*max_attempts, failures).then_some(*delay),
            Self::ExponentialBackoff {
                max_attempts,
                initial_delay,
                max_delay,
                multiplier,
            } => {
                if !allows(*max_attempts, failures) {
                    return None;
                }
                let exponent = failures.saturating_sub(1).min(64) as i32;
                let delay_ms = initial_delay.as_millis() as f64 * multiplier.powi(exponent);
                let capped = delay_ms.min(max_delay.as_millis() as f64);
                Some(Duration::from_millis(capped as u64))
            }
        }
    }

    /// Maximum number of attempts, `None` when unbounded.
    pub fn max_attempts(&self) -> Option<u32> {
        match self {
            Self::None => Some(1),
            Self::Fixed { max_attempts, .. } => *max_attempts,
            Self::ExponentialBackoff { max_attempts, .. } => *max_attempts,
        }
    }
}

fn allows(max_attempts: Option<u32>, failures: u32) -> bool {
    max_attempts.map_or(true, |max| failures < max)
}
