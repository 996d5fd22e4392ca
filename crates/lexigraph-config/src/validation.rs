//! Configuration validation module.
//!
//! Collects every problem in one pass so a bad config file reports all of
//! its mistakes at once.

use crate::{AppConfig, BatchConfig, GenerationDefaults};
use lexigraph_core::TelemetryConfig;
use std::fmt;

/// Configuration validation error variants.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValidationError {
    /// Concurrency must be at least 1.
    ZeroConcurrency,
    /// Event channel capacity must be positive.
    ZeroEventCapacity,
    /// The retry delay cap is below the base delay.
    BackoffCapBelowBase { base_ms: u64, cap_ms: u64 },
    /// A generation default exceeds its configured maximum.
    DefaultExceedsLimit { name: String, value: f64, maximum: f64 },
    /// A generation limit is zero or negative.
    NonPositiveLimit { name: String },
    /// Image dimension is not a multiple of 8.
    DimensionNotAligned { name: String, value: u32 },
    /// Log filter directive is blank.
    EmptyLogFilter,
}

impl fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroConcurrency => write!(f, "batch.max_concurrent must be at least 1"),
            Self::ZeroEventCapacity => write!(f, "batch.event_capacity must be at least 1"),
            Self::BackoffCapBelowBase { base_ms, cap_ms } => {
                write!(
                    f,
                    "batch.max_backoff_ms ({}) is below batch.retry_backoff_ms ({})",
                    cap_ms, base_ms
                )
            }
            Self::DefaultExceedsLimit {
                name,
                value,
                maximum,
            } => {
                write!(f, "generation.{} = {} exceeds maximum {}", name, value, maximum)
            }
            Self::NonPositiveLimit { name } => {
                write!(f, "generation.{} must be positive", name)
            }
            Self::DimensionNotAligned { name, value } => {
                write!(f, "generation.{} = {} is not a multiple of 8", name, value)
            }
            Self::EmptyLogFilter => write!(f, "telemetry.filter must not be empty"),
        }
    }
}

impl std::error::Error for ConfigValidationError {}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validates the entire application configuration.
    ///
    /// Returns Ok(()) if valid, or Err with all validation errors found.
    pub fn validate(config: &AppConfig) -> Result<(), Vec<ConfigValidationError>> {
        let mut errors = Vec::new();

        Self::validate_batch(&config.batch, &mut errors);
        Self::validate_generation(&config.generation, &mut errors);
        Self::validate_telemetry(&config.telemetry, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_batch(config: &BatchConfig, errors: &mut Vec<ConfigValidationError>) {
        if config.max_concurrent == 0 {
            errors.push(ConfigValidationError::ZeroConcurrency);
        }
        if config.event_capacity == 0 {
            errors.push(ConfigValidationError::ZeroEventCapacity);
        }
        if config.max_backoff_ms < config.retry_backoff_ms {
            errors.push(ConfigValidationError::BackoffCapBelowBase {
                base_ms: config.retry_backoff_ms,
                cap_ms: config.max_backoff_ms,
            });
        }
    }

    fn validate_generation(config: &GenerationDefaults, errors: &mut Vec<ConfigValidationError>) {
        let limits = [
            ("max_width", f64::from(config.max_width)),
            ("max_height", f64::from(config.max_height)),
            ("max_steps", f64::from(config.max_steps)),
            ("max_guidance_scale", f64::from(config.max_guidance_scale)),
            ("max_prompt_length", config.max_prompt_length as f64),
        ];
        for (name, value) in limits {
            if value <= 0.0 {
                errors.push(ConfigValidationError::NonPositiveLimit {
                    name: name.to_string(),
                });
            }
        }

        let defaults = [
            ("default_width", f64::from(config.default_width), f64::from(config.max_width)),
            ("default_height", f64::from(config.default_height), f64::from(config.max_height)),
            ("default_steps", f64::from(config.default_steps), f64::from(config.max_steps)),
            (
                "default_guidance_scale",
                f64::from(config.default_guidance_scale),
                f64::from(config.max_guidance_scale),
            ),
        ];
        for (name, value, maximum) in defaults {
            if value > maximum {
                errors.push(ConfigValidationError::DefaultExceedsLimit {
                    name: name.to_string(),
                    value,
                    maximum,
                });
            }
        }

        for (name, value) in [
            ("default_width", config.default_width),
            ("default_height", config.default_height),
        ] {
            if value % 8 != 0 {
                errors.push(ConfigValidationError::DimensionNotAligned {
                    name: name.to_string(),
                    value,
                });
            }
        }
    }

    fn validate_telemetry(config: &TelemetryConfig, errors: &mut Vec<ConfigValidationError>) {
        if config.enabled && config.filter.trim().is_empty() {
            errors.push(ConfigValidationError::EmptyLogFilter);
        }
    }
}
