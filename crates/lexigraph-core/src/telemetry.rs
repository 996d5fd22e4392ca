//! Tracing subscriber setup.
//!
//! Installs a `tracing-subscriber` registry with an `EnvFilter` and either a
//! human-readable or JSON formatter writing to stderr. `RUST_LOG` overrides
//! the configured filter when set.

#[cfg(feature = "telemetry")]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::LexigraphResult;
use serde::{Deserialize, Serialize};

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Whether log output is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Service name attached to the startup log line.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_filter")]
    pub filter: String,

    /// Emit JSON lines instead of the compact text format.
    #[serde(default)]
    pub json: bool,
}

fn default_enabled() -> bool {
    true
}

fn default_service_name() -> String {
    "lexigraph".to_string()
}

fn default_filter() -> String {
    "info,lexigraph=debug".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            service_name: default_service_name(),
            filter: default_filter(),
            json: false,
        }
    }
}

/// Initialize the global tracing subscriber.
///
/// Returns a configuration error if the filter directive does not parse or a
/// global subscriber is already installed.
#[cfg(feature = "telemetry")]
pub fn init_telemetry(config: &TelemetryConfig) -> LexigraphResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.filter).map_err(|e| {
            crate::LexigraphError::Configuration(format!(
                "Invalid log filter '{}': {}",
                config.filter, e
            ))
        })?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if config.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };

    installed.map_err(|e| {
        crate::LexigraphError::Configuration(format!("Failed to install subscriber: {}", e))
    })?;

    tracing::info!(
        service_name = %config.service_name,
        json = config.json,
        "Telemetry initialized"
    );

    Ok(())
}

/// Placeholder for when telemetry feature is disabled.
#[cfg(not(feature = "telemetry"))]
pub fn init_telemetry(_config: &TelemetryConfig) -> LexigraphResult<()> {
    Ok(())
}
