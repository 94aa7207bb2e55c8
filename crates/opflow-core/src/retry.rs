//! Backoff schedules for the retry loop.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Delay schedule applied between failed attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Backoff {
    /// Retry immediately.
    None,

    /// Fixed delay between attempts.
    Constant { delay: Duration },

    /// Exponentially growing delay with optional random jitter.
    Exponential {
        initial_delay: Duration,
        multiplier: f64,
        max_delay: Duration,
        /// Upper bound of the random delay added on top.
        max_jitter: Duration,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            initial_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            max_jitter: Duration::from_millis(100),
        }
    }
}

impl Backoff {
    /// Exponential backoff without jitter.
    pub fn exponential(initial_delay: Duration, max_delay: Duration) -> Self {
        Self::Exponential {
            initial_delay,
            multiplier: 2.0,
            max_delay,
            max_jitter: Duration::ZERO,
        }
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self {
            Backoff::None => Duration::ZERO,
            Backoff::Constant { delay } => *delay,
            Backoff::Exponential {
                initial_delay,
                multiplier,
                max_delay,
                max_jitter,
            } => {
                // Negative or NaN multipliers count as zero.
                let multiplier = multiplier.max(0.0);
                let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
                let base = initial_delay.as_secs_f64() * multiplier.powi(exponent);
                let capped = Duration::try_from_secs_f64(base.min(max_delay.as_secs_f64()))
                    .unwrap_or(*max_delay);

                if max_jitter.is_zero() {
                    capped
                } else {
                    let jitter_ms = rand::thread_rng().gen_range(0..=max_jitter.as_millis() as u64);
                    capped + Duration::from_millis(jitter_ms)
                }
            }
        }
    }
}
