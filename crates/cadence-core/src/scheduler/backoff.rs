//! Retry backoff for failed task executions
//!
//! Delay doubles with each consecutive failure: `base × 2^(retry − 1)`.
//! There is no jitter. The ceiling is optional and off by default.

use chrono::Duration;

/// Default base delay in seconds
pub const DEFAULT_BASE_DELAY_SECS: u64 = 60;

/// Backoff policy applied when a task fails and has retries left
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the first retry
    pub base_delay_secs: u64,
    /// Optional ceiling for a single delay
    pub max_delay_secs: Option<u64>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_secs: DEFAULT_BASE_DELAY_SECS,
            max_delay_secs: None,
        }
    }
}

impl RetryPolicy {
    /// Create the default policy
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set base delay
    #[must_use]
    pub fn with_base_delay(mut self, secs: u64) -> Self {
        self.base_delay_secs = secs;
        self
    }

    /// Set delay ceiling
    #[must_use]
    pub fn with_max_delay(mut self, secs: Option<u64>) -> Self {
        self.max_delay_secs = secs;
        self
    }

    /// Delay in seconds before retry number `retry` (1-based)
    pub fn delay_secs(&self, retry: u32) -> u64 {
        let exponent = retry.saturating_sub(1);
        let factor = 2u64.checked_pow(exponent).unwrap_or(u64::MAX);
        let delay = self.base_delay_secs.saturating_mul(factor);

        match self.max_delay_secs {
            Some(max) => delay.min(max),
            None => delay,
        }
    }

    /// Delay before retry number `retry` as a chrono duration
    pub fn delay(&self, retry: u32) -> Duration {
        // i64 seconds are clamped well below chrono's limit
        let secs = i64::try_from(self.delay_secs(retry))
            .unwrap_or(i64::MAX)
            .min(MAX_DELAY_SECS);
        Duration::seconds(secs)
    }
}

/// Largest delay chrono can represent comfortably (~100 years)
const MAX_DELAY_SECS: i64 = 100 * 365 * 86_400;
