//! Logging setup

use crate::RuntimeError;
use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Filter used when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Plain,
            level: "info".to_string(),
        }
    }
}

/// Install the global subscriber. `RUST_LOG` wins over `config.level`.
///
/// Fails (instead of panicking) if a subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), RuntimeError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| RuntimeError::Logging(e.to_string()))?;

    let result = match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .try_init(),
        LogFormat::Plain => tracing_subscriber::registry()
            .with(fmt::layer().with_target(true))
            .with(filter)
            .try_init(),
    };

    result.map_err(|e| RuntimeError::Logging(e.to_string()))
}
