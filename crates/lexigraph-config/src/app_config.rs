//! Application configuration structures.

use lexigraph_core::TelemetryConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application name and metadata.
    #[serde(default)]
    pub app: AppMetadata,

    /// Batch queue configuration.
    #[serde(default)]
    pub batch: BatchConfig,

    /// Generation defaults and limits.
    #[serde(default)]
    pub generation: GenerationDefaults,

    /// Logging configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Application metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppMetadata {
    /// Application name.
    pub name: String,
    /// Application version.
    pub version: String,
    /// Environment (development, staging, production).
    pub environment: String,
}

impl Default for AppMetadata {
    fn default() -> Self {
        Self {
            name: "lexigraph".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            environment: "development".to_string(),
        }
    }
}

/// Backoff strategy between automatic retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Same delay before every retry.
    #[default]
    Fixed,
    /// Delay doubles with each retry.
    Exponential,
    /// Delay grows by the base delay with each retry.
    Linear,
}

impl fmt::Display for BackoffStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed => write!(f, "fixed"),
            Self::Exponential => write!(f, "exponential"),
            Self::Linear => write!(f, "linear"),
        }
    }
}

/// Batch queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Maximum number of generations in flight at once.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Automatic retries after the first failed attempt.
    #[serde(default)]
    pub max_retries: u32,

    /// Whether failed jobs are retried automatically.
    #[serde(default)]
    pub auto_retry: bool,

    /// Base delay before a retry, in milliseconds.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// How the retry delay grows between attempts.
    #[serde(default)]
    pub backoff_strategy: BackoffStrategy,

    /// Upper bound on the retry delay, in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Capacity of the event broadcast channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            max_retries: 0,
            auto_retry: false,
            retry_backoff_ms: default_retry_backoff_ms(),
            backoff_strategy: BackoffStrategy::default(),
            max_backoff_ms: default_max_backoff_ms(),
            event_capacity: default_event_capacity(),
        }
    }
}

fn default_max_concurrent() -> usize {
    1
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_max_backoff_ms() -> u64 {
    60_000
}

fn default_event_capacity() -> usize {
    1024
}

impl BatchConfig {
    /// Returns the base retry delay as a Duration.
    #[must_use]
    pub const fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Returns the retry delay cap as a Duration.
    #[must_use]
    pub const fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

/// Generation defaults and limits used by the studio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationDefaults {
    /// Default image width in pixels.
    pub default_width: u32,
    /// Default image height in pixels.
    pub default_height: u32,
    /// Default number of denoising steps.
    pub default_steps: u32,
    /// Default classifier-free guidance scale.
    pub default_guidance_scale: f32,
    /// Maximum image width in pixels.
    pub max_width: u32,
    /// Maximum image height in pixels.
    pub max_height: u32,
    /// Maximum number of denoising steps.
    pub max_steps: u32,
    /// Maximum guidance scale.
    pub max_guidance_scale: f32,
    /// Maximum prompt length in characters.
    pub max_prompt_length: usize,
}

impl Default for GenerationDefaults {
    fn default() -> Self {
        Self {
            default_width: 512,
            default_height: 512,
            default_steps: 20,
            default_guidance_scale: 7.5,
            max_width: 1024,
            max_height: 1024,
            max_steps: 100,
            max_guidance_scale: 20.0,
            max_prompt_length: 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_defaults() {
        let batch = BatchConfig::default();
        assert_eq!(batch.max_concurrent, 1);
        assert_eq!(batch.max_retries, 0);
        assert!(!batch.auto_retry);
        assert_eq!(batch.retry_backoff(), Duration::from_secs(1));
        assert_eq!(batch.backoff_strategy, BackoffStrategy::Fixed);
    }

    #[test]
    fn test_backoff_strategy_serde() {
        let strategy: BackoffStrategy = serde_json::from_str("\"exponential\"").unwrap();
        assert_eq!(strategy, BackoffStrategy::Exponential);
        assert_eq!(strategy.to_string(), "exponential");
    }

    #[test]
    fn test_partial_batch_section() {
        let batch: BatchConfig =
            serde_json::from_str(r#"{"max_concurrent": 4, "auto_retry": true}"#).unwrap();
        assert_eq!(batch.max_concurrent, 4);
        assert!(batch.auto_retry);
        assert_eq!(batch.event_capacity, 1024);
    }
}
