//! Retry policy applied by the paginated fetcher to transient source errors.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// How the wait between two attempts grows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Backoff {
    /// Always wait `base_delay`.
    Fixed,
    /// Multiply the wait by `factor` after every failure, capped at `max_delay`.
    Exponential { factor: f64 },
}

/// Retry budget and backoff for one page request.
///
/// The default keeps retrying forever with a fixed two second pause. Set
/// `max_attempts` to bound the loop when the source may fail permanently
/// (revoked credentials, delisted instrument).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts per page including the first one; `None` retries forever
    pub max_attempts: Option<u32>,
    /// Wait after the first failure, in milliseconds
    pub base_delay_ms: u64,
    /// Upper bound on any single wait, in milliseconds
    pub max_delay_ms: u64,
    pub backoff: Backoff,
    /// Random extra wait in percent of the computed delay
    pub jitter_percent: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: None,
            base_delay_ms: 2_000,
            max_delay_ms: 2_000,
            backoff: Backoff::Fixed,
            jitter_percent: 0,
        }
    }
}

impl RetryPolicy {
    /// Policy that retries immediately, up to `max_attempts` times. Handy in tests.
    pub fn immediate(max_attempts: Option<u32>) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 0,
            max_delay_ms: 0,
            backoff: Backoff::Fixed,
            jitter_percent: 0,
        }
    }

    /// Bounded exponential backoff.
    pub fn exponential(max_attempts: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            base_delay_ms,
            max_delay_ms,
            backoff: Backoff::Exponential { factor: 2.0 },
            jitter_percent: 10,
        }
    }

    /// Whether another attempt is allowed after `failures` failed ones.
    pub fn allows_retry(&self, failures: u32) -> bool {
        match self.max_attempts {
            Some(max) => failures < max,
            None => true,
        }
    }

    /// Delay before retrying after the `failures`-th consecutive failure (1-based), without jitter.
    pub fn base_delay_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1);
        let delay_ms = match self.backoff {
            Backoff::Fixed => self.base_delay_ms,
            Backoff::Exponential { factor } => {
                let grown = self.base_delay_ms as f64 * factor.max(1.0).powi(exponent as i32);
                if grown.is_finite() {
                    grown.min(u64::MAX as f64) as u64
                } else {
                    u64::MAX
                }
            }
        };
        Duration::from_millis(delay_ms.min(self.max_delay_ms.max(self.base_delay_ms)))
    }

    /// Delay before retrying, including jitter.
    pub fn delay_for(&self, failures: u32) -> Duration {
        let base = self.base_delay_for(failures).as_millis() as u64;
        Duration::from_millis(jitter_wait(base, self.jitter_percent))
    }
}

/// `base_ms` plus a random extra of up to `jitter_percent` percent.
pub fn jitter_wait(base_ms: u64, jitter_percent: u32) -> u64 {
    if jitter_percent == 0 || base_ms == 0 {
        return base_ms;
    }
    let jitter_range = std::cmp::max(1, base_ms.saturating_mul(u64::from(jitter_percent)) / 100);
    base_ms.saturating_add(rand::thread_rng().gen_range(0..jitter_range))
}
