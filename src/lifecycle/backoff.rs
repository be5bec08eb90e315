//! Exponential backoff for retry scheduling: the delay after attempt `n`
//! (1-based) is `base_delay_ms * 2^(n-1)`, capped at the task's
//! `max_delay_ms`. Deterministic by design.

use crate::models::RetryConfig;

pub struct BackoffCalculator;

impl BackoffCalculator {
    /// Delay to apply after the given failed attempt number
    pub fn delay_ms(retry: &RetryConfig, failed_attempt: u32) -> u64 {
        let exponent = failed_attempt.saturating_sub(1).min(32);
        let factor = 1u64 << exponent;
        retry
            .base_delay_ms
            .saturating_mul(factor)
            .min(retry.max_delay_ms)
    }
}
