//! Logging configuration and subscriber setup

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::error::{ExportError, ExportResult};

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format
    #[default]
    Pretty,
    /// Compact single-line text format
    Compact,
    /// JSON format for structured logging
    Json,
}

/// Logging configuration options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is not set
    pub level: String,
    /// Output format
    pub format: LogFormat,
    /// Include target module information
    pub target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            target: false,
        }
    }
}

impl LoggingConfig {
    /// Build the filter, letting `RUST_LOG` override the configured level
    pub fn env_filter(&self) -> ExportResult<EnvFilter> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(&self.level).map_err(|e| {
                ExportError::Config(format!("invalid log level '{}': {}", self.level, e))
            }),
        }
    }
}

/// Install the global tracing subscriber; logs go to stderr so stdout stays
/// free for event output
pub fn init_logging(config: &LoggingConfig) -> ExportResult<()> {
    let filter = config.env_filter()?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.target)
        .with_writer(std::io::stderr);

    let result = match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.try_init(),
    };

    result.map_err(|e| ExportError::Config(format!("failed to initialise logging: {}", e)))?;

    tracing::debug!(
        level = %config.level,
        format = ?config.format,
        "Logging initialised"
    );
    Ok(())
}
