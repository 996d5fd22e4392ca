//! Configuration loader with layered sources.

use crate::{AppConfig, ConfigValidator};
use config::{Config, ConfigError, Environment, File};
use lexigraph_core::LexigraphError;
use std::path::Path;
use tracing::{debug, info};

/// Loads and validates the layered configuration once, at startup.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config: AppConfig,
}

impl ConfigLoader {
    /// Creates a new configuration loader.
    ///
    /// Configuration is loaded from multiple sources in order:
    /// 1. `config/default.toml` - Default values
    /// 2. `config/{environment}.toml` - Environment-specific overrides
    /// 3. `config/local.toml` - Local overrides
    /// 4. Environment variables with the `LEXIGRAPH__` prefix, e.g.
    ///    `LEXIGRAPH__BATCH__MAX_CONCURRENT=4`
    pub fn new(config_dir: impl Into<String>) -> Result<Self, LexigraphError> {
        let config_dir: String = config_dir.into();
        let config = Self::load_config(&config_dir)?;
        Ok(Self { config })
    }

    /// Returns the loaded configuration.
    pub fn get(&self) -> &AppConfig {
        &self.config
    }

    /// Loads configuration from the specified directory.
    fn load_config(config_dir: &str) -> Result<AppConfig, LexigraphError> {
        if let Err(e) = dotenvy::dotenv() {
            debug!("No .env file found or error loading it: {}", e);
        }

        let environment =
            std::env::var("LEXIGRAPH_ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        info!(environment = %environment, config_dir = %config_dir, "Loading configuration");

        let mut builder = Config::builder();

        for name in ["default", environment.as_str(), "local"] {
            let path = format!("{}/{}.toml", config_dir, name);
            if Path::new(&path).exists() {
                debug!("Loading config from: {}", path);
                builder = builder.add_source(File::with_name(&path).required(false));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("LEXIGRAPH")
                .separator("__")
                .try_parsing(true),
        );

        let mut app_config: AppConfig = builder
            .build()
            .and_then(Config::try_deserialize::<AppConfig>)
            .map_err(config_error_to_lexigraph_error)?;

        app_config.app.environment = environment;

        ConfigValidator::validate(&app_config).map_err(|errors| {
            let message = errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            LexigraphError::Configuration(message)
        })?;

        Ok(app_config)
    }
}

fn config_error_to_lexigraph_error(err: ConfigError) -> LexigraphError {
    LexigraphError::Configuration(err.to_string())
}
