//! Scheduler configuration.

use crate::error::{JobError, JobResult};
use crate::retry::RetryPolicy;
use lexigraph_config::BatchConfig;
use serde::{Deserialize, Serialize};

/// Runtime settings for a [`Scheduler`](crate::scheduler::Scheduler).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum number of executor calls in flight.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Retry policy applied to retryable failures.
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Capacity of the event broadcast channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            retry: RetryPolicy::default(),
            event_capacity: default_event_capacity(),
        }
    }
}

fn default_max_concurrent() -> usize {
    1
}

fn default_event_capacity() -> usize {
    1024
}

impl SchedulerConfig {
    /// Creates a configuration with the given concurrency and no retries.
    #[must_use]
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent,
            ..Self::default()
        }
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the event channel capacity.
    #[must_use]
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Rejects settings the scheduler cannot run with.
    pub fn validate(&self) -> JobResult<()> {
        if self.max_concurrent == 0 {
            return Err(JobError::Configuration(
                "max_concurrent must be at least 1".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(JobError::Configuration(
                "event_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl From<&BatchConfig> for SchedulerConfig {
    fn from(config: &BatchConfig) -> Self {
        Self {
            max_concurrent: config.max_concurrent,
            retry: RetryPolicy::from_batch_config(config),
            event_capacity: config.event_capacity,
        }
    }
}
