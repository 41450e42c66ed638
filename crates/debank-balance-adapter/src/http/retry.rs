/*
[INPUT]:  Attempt index and configured base delay / jitter / attempt cap
[OUTPUT]: Sleep durations for proactive throttling and failure penalties
[POS]:    HTTP layer - exponential backoff policy
[UPDATE]: When changing backoff multipliers or defaults
*/

use rand::Rng;
use std::time::Duration;

use crate::http::BalanceError;

const RATE_LIMIT_FACTOR: u32 = 2;
const TIMEOUT_FACTOR: u32 = 3;

/// Backoff policy for one executor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_jitter: Duration,
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1500),
            max_jitter: Duration::from_millis(500),
            max_retries: 3,
        }
    }
}

impl RetryPolicy {
    /// `base_delay * 2^attempt`
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Paid before every attempt, the first one included
    pub fn throttle_delay(&self, attempt: u32) -> Duration {
        self.backoff(attempt).saturating_add(self.jitter())
    }

    /// Extra wait after a 429
    pub fn rate_limit_delay(&self, attempt: u32) -> Duration {
        self.backoff(attempt).saturating_mul(RATE_LIMIT_FACTOR)
    }

    /// Extra wait after a transport timeout
    pub fn timeout_delay(&self, attempt: u32) -> Duration {
        self.backoff(attempt).saturating_mul(TIMEOUT_FACTOR)
    }

    /// Extra wait owed for a failed attempt, if any
    pub fn penalty(&self, error: &BalanceError, attempt: u32) -> Option<Duration> {
        match error {
            BalanceError::RateLimited { .. } => Some(self.rate_limit_delay(attempt)),
            err if err.is_timeout() => Some(self.timeout_delay(attempt)),
            _ => None,
        }
    }

    fn jitter(&self) -> Duration {
        if self.max_jitter.is_zero() {
            return Duration::ZERO;
        }
        let seconds = rand::thread_rng().gen_range(0.0..=self.max_jitter.as_secs_f64());
        Duration::from_secs_f64(seconds)
    }
}
