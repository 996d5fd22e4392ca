//! Retry policies for failed generation attempts.

use lexigraph_config::{BackoffStrategy, BatchConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry strategy enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    /// No retry.
    None,
    /// Fixed delay between retries.
    Fixed,
    /// Delay doubles (by `multiplier`) on each retry.
    Exponential,
    /// Delay grows by the initial delay on each retry.
    Linear,
}

/// Retry policy configuration.
///
/// `max_retries` counts retries, not attempts: a job may run at most
/// `max_retries + 1` times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub strategy: RetryStrategy,
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Backoff multiplier (exponential only).
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl RetryPolicy {
    /// Creates a policy with no retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            strategy: RetryStrategy::None,
            max_retries: 0,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            multiplier: 1.0,
        }
    }

    /// Creates a fixed delay retry policy.
    #[must_use]
    pub fn fixed(max_retries: u32, delay_ms: u64) -> Self {
        Self {
            strategy: RetryStrategy::Fixed,
            max_retries,
            initial_delay_ms: delay_ms,
            max_delay_ms: delay_ms,
            multiplier: 1.0,
        }
    }

    /// Creates an exponential backoff retry policy starting at one second.
    #[must_use]
    pub fn exponential(max_retries: u32) -> Self {
        Self {
            strategy: RetryStrategy::Exponential,
            max_retries,
            initial_delay_ms: 1_000,
            max_delay_ms: 60_000,
            multiplier: 2.0,
        }
    }

    /// Creates a linear backoff retry policy.
    #[must_use]
    pub fn linear(max_retries: u32, increment_ms: u64) -> Self {
        Self {
            strategy: RetryStrategy::Linear,
            max_retries,
            initial_delay_ms: increment_ms,
            max_delay_ms: increment_ms.saturating_mul(u64::from(max_retries.max(1))),
            multiplier: 1.0,
        }
    }

    /// Builds the policy described by the `[batch]` configuration section.
    ///
    /// Retries are disabled unless `auto_retry` is set.
    #[must_use]
    pub fn from_batch_config(config: &BatchConfig) -> Self {
        if !config.auto_retry || config.max_retries == 0 {
            return Self::none();
        }

        let policy = match config.backoff_strategy {
            BackoffStrategy::Fixed => Self::fixed(config.max_retries, config.retry_backoff_ms),
            BackoffStrategy::Exponential => Self::exponential(config.max_retries)
                .with_initial_delay(config.retry_backoff()),
            BackoffStrategy::Linear => Self::linear(config.max_retries, config.retry_backoff_ms),
        };
        policy.with_max_delay(config.max_backoff())
    }

    /// Sets the initial delay.
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay_ms = duration_to_ms(delay);
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay_ms = duration_to_ms(delay);
        self
    }

    /// Sets the backoff multiplier.
    #[must_use]
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Returns true if a job whose attempt number `attempt` just failed may run again.
    #[must_use]
    pub fn should_retry(&self, attempt: u32) -> bool {
        self.strategy != RetryStrategy::None && attempt <= self.max_retries
    }

    /// Retries left after attempt number `attempt` failed.
    #[must_use]
    pub fn remaining_after(&self, attempt: u32) -> u32 {
        if self.strategy == RetryStrategy::None {
            return 0;
        }
        (self.max_retries + 1).saturating_sub(attempt)
    }

    /// Delay before the given retry (1 for the first retry).
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn delay_for_attempt(&self, retry: u32) -> Duration {
        if retry == 0 || self.strategy == RetryStrategy::None {
            return Duration::ZERO;
        }

        let base_delay = match self.strategy {
            RetryStrategy::None => 0,
            RetryStrategy::Fixed => self.initial_delay_ms,
            RetryStrategy::Exponential => {
                let exp = i32::try_from(retry - 1).unwrap_or(i32::MAX);
                (self.initial_delay_ms as f64 * self.multiplier.powi(exp)) as u64
            }
            RetryStrategy::Linear => self.initial_delay_ms.saturating_mul(u64::from(retry)),
        };

        Duration::from_millis(base_delay.min(self.max_delay_ms))
    }
}

fn duration_to_ms(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}
