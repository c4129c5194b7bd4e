//! Exporter configuration
//!
//! Values are layered with the precedence CLI > environment (`ATACUT_*`) >
//! TOML file > built-in defaults. The TOML file keeps its keys in an
//! `[atacut]` table:
//!
//! ```toml
//! [atacut]
//! ffmpeg_path = "/usr/local/bin/ffmpeg"
//! max_concurrent_exports = 2
//! process_timeout_secs = 3600
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::app::export_queue::{QueueSettings, DEFAULT_EVENT_CAPACITY};
use crate::error::{ExportError, ExportResult};
use crate::filters::Canvas;
use crate::output::DEFAULT_MIN_OUTPUT_BYTES;
use crate::utils::logging::{LogFormat, LoggingConfig};

/// Prefix of every environment variable read by [`ExporterConfig::apply_env`]
pub const ENV_PREFIX: &str = "ATACUT_";

/// Config files looked up when none is given explicitly
pub const DEFAULT_CONFIG_PATHS: [&str; 2] = ["atacut.toml", "config/atacut.toml"];

/// Runtime configuration of the exporter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExporterConfig {
    /// ffmpeg binary, resolved through `PATH` when relative
    pub ffmpeg_path: PathBuf,
    /// Jobs processed at the same time
    pub max_concurrent_exports: usize,
    /// Root of per-job working directories; system temp dir when unset
    pub temp_dir: Option<PathBuf>,
    /// Watchdog for a single ffmpeg process; disabled when unset
    pub process_timeout_secs: Option<u64>,
    /// Smallest output accepted after concatenation
    pub min_output_bytes: u64,
    pub canvas_width: u32,
    pub canvas_height: u32,
    /// Buffered events per subscriber before it lags
    pub event_capacity: usize,
    pub log_level: String,
    pub json_logs: bool,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            max_concurrent_exports: 1,
            temp_dir: None,
            process_timeout_secs: None,
            min_output_bytes: DEFAULT_MIN_OUTPUT_BYTES,
            canvas_width: 1920,
            canvas_height: 1080,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Values given on the command line; `None` leaves lower layers untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub ffmpeg_path: Option<PathBuf>,
    pub max_concurrent_exports: Option<usize>,
    pub temp_dir: Option<PathBuf>,
    pub process_timeout_secs: Option<u64>,
    pub log_level: Option<String>,
    pub json_logs: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    atacut: ExporterConfig,
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> ExportResult<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ExportError::Config(format!("{}{}={:?}: {}", ENV_PREFIX, key, value, e)))
}

fn parse_bool(key: &str, value: &str) -> ExportResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ExportError::Config(format!(
            "{}{}={:?}: expected a boolean",
            ENV_PREFIX, key, other
        ))),
    }
}

impl ExporterConfig {
    /// Build the effective configuration from every layer
    pub fn load(file: Option<&Path>, overrides: &ConfigOverrides) -> ExportResult<Self> {
        let mut config = match file {
            Some(path) => Self::from_file(path)?,
            None => match DEFAULT_CONFIG_PATHS.iter().map(Path::new).find(|p| p.is_file()) {
                Some(path) => Self::from_file(path)?,
                None => {
                    debug!("No configuration file found, using defaults");
                    Self::default()
                }
            },
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.apply_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML file; missing keys keep their defaults
    pub fn from_file(path: &Path) -> ExportResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ExportError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml(&content)
            .map_err(|e| ExportError::Config(format!("{}: {}", path.display(), e)))?;
        info!(path = %path.display(), "Configuration file loaded");
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str::<ConfigFile>(content).map(|file| file.atacut)
    }

    pub fn to_toml(&self) -> ExportResult<String> {
        #[derive(Serialize)]
        struct Out<'a> {
            atacut: &'a ExporterConfig,
        }
        toml::to_string_pretty(&Out { atacut: self })
            .map_err(|e| ExportError::Config(format!("cannot serialize configuration: {}", e)))
    }

    /// Apply `ATACUT_*` variables through `lookup`, which receives the full
    /// variable name
    pub fn apply_env<F>(&mut self, lookup: F) -> ExportResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(&format!("{}{}", ENV_PREFIX, key)).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("FFMPEG_PATH") {
            self.ffmpeg_path = PathBuf::from(v.trim());
        }
        if let Some(v) = get("MAX_CONCURRENT_EXPORTS") {
            self.max_concurrent_exports = parse_env("MAX_CONCURRENT_EXPORTS", &v)?;
        }
        if let Some(v) = get("TEMP_DIR") {
            self.temp_dir = Some(PathBuf::from(v.trim()));
        }
        if let Some(v) = get("PROCESS_TIMEOUT_SECS") {
            self.process_timeout_secs = Some(parse_env("PROCESS_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = get("MIN_OUTPUT_BYTES") {
            self.min_output_bytes = parse_env("MIN_OUTPUT_BYTES", &v)?;
        }
        if let Some(v) = get("CANVAS_WIDTH") {
            self.canvas_width = parse_env("CANVAS_WIDTH", &v)?;
        }
        if let Some(v) = get("CANVAS_HEIGHT") {
            self.canvas_height = parse_env("CANVAS_HEIGHT", &v)?;
        }
        if let Some(v) = get("EVENT_CAPACITY") {
            self.event_capacity = parse_env("EVENT_CAPACITY", &v)?;
        }
        if let Some(v) = get("LOG_LEVEL") {
            self.log_level = v.trim().to_string();
        }
        if let Some(v) = get("JSON_LOGS") {
            self.json_logs = parse_bool("JSON_LOGS", &v)?;
        }
        Ok(())
    }

    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(path) = &overrides.ffmpeg_path {
            self.ffmpeg_path = path.clone();
        }
        if let Some(max) = overrides.max_concurrent_exports {
            self.max_concurrent_exports = max;
        }
        if let Some(dir) = &overrides.temp_dir {
            self.temp_dir = Some(dir.clone());
        }
        if let Some(secs) = overrides.process_timeout_secs {
            self.process_timeout_secs = Some(secs);
        }
        if let Some(level) = &overrides.log_level {
            self.log_level = level.clone();
        }
        if let Some(json) = overrides.json_logs {
            self.json_logs = json;
        }
    }

    pub fn validate(&self) -> ExportResult<()> {
        if self.ffmpeg_path.as_os_str().is_empty() {
            return Err(ExportError::Config("ffmpeg_path must not be empty".to_string()));
        }
        if self.max_concurrent_exports == 0 {
            return Err(ExportError::Config(
                "max_concurrent_exports must be at least 1".to_string(),
            ));
        }
        if self.canvas_width == 0 || self.canvas_height == 0 {
            return Err(ExportError::Config(format!(
                "canvas size must be positive, got {}x{}",
                self.canvas_width, self.canvas_height
            )));
        }
        if self.event_capacity == 0 {
            return Err(ExportError::Config("event_capacity must be at least 1".to_string()));
        }
        if self.process_timeout_secs == Some(0) {
            return Err(ExportError::Config(
                "process_timeout_secs must be positive; omit it to disable the watchdog".to_string(),
            ));
        }
        Ok(())
    }

    pub fn process_timeout(&self) -> Option<Duration> {
        self.process_timeout_secs.map(Duration::from_secs)
    }

    pub fn canvas(&self) -> Canvas {
        Canvas {
            width: self.canvas_width,
            height: self.canvas_height,
        }
    }

    pub fn temp_root(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn queue_settings(&self) -> QueueSettings {
        QueueSettings {
            max_concurrent: self.max_concurrent_exports,
            temp_root: self.temp_root(),
            min_output_bytes: self.min_output_bytes,
            canvas: self.canvas(),
            event_capacity: self.event_capacity,
        }
    }

    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig {
            level: self.log_level.clone(),
            format: if self.json_logs {
                LogFormat::Json
            } else {
                LogFormat::Pretty
            },
            target: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = ExporterConfig::default();
        config.validate().unwrap();
        assert_eq!(config.max_concurrent_exports, 1);
        assert_eq!(config.min_output_bytes, 1000);
        assert_eq!(config.canvas(), Canvas::default());
        assert_eq!(config.process_timeout(), None);
    }

    #[test]
    fn test_toml_layer_keeps_missing_defaults() {
        let config = ExporterConfig::from_toml(
            "[atacut]\nffmpeg_path = \"/opt/ffmpeg\"\nmax_concurrent_exports = 3\n",
        )
        .unwrap();
        assert_eq!(config.ffmpeg_path, PathBuf::from("/opt/ffmpeg"));
        assert_eq!(config.max_concurrent_exports, 3);
        assert_eq!(config.event_capacity, DEFAULT_EVENT_CAPACITY);
    }

    #[test]
    fn test_unknown_toml_keys_are_rejected() {
        assert!(ExporterConfig::from_toml("[atacut]\nmax_jobs = 3\n").is_err());
    }

    #[test]
    fn test_precedence_cli_over_env_over_file() {
        let mut config =
            ExporterConfig::from_toml("[atacut]\nmax_concurrent_exports = 2\nlog_level = \"warn\"\n")
                .unwrap();
        config
            .apply_env(env(&[
                ("ATACUT_MAX_CONCURRENT_EXPORTS", "4"),
                ("ATACUT_JSON_LOGS", "yes"),
            ]))
            .unwrap();
        assert_eq!(config.max_concurrent_exports, 4);
        assert_eq!(config.log_level, "warn");
        assert!(config.json_logs);

        config.apply_overrides(&ConfigOverrides {
            max_concurrent_exports: Some(6),
            ..ConfigOverrides::default()
        });
        assert_eq!(config.max_concurrent_exports, 6);
        assert_eq!(config.logging_config().format, LogFormat::Json);
    }

    #[test]
    fn test_bad_env_value_is_config_error() {
        let mut config = ExporterConfig::default();
        let err = config
            .apply_env(env(&[("ATACUT_MIN_OUTPUT_BYTES", "lots")]))
            .unwrap_err();
        assert!(matches!(err, ExportError::Config(_)));
        assert!(err.to_string().contains("ATACUT_MIN_OUTPUT_BYTES"));
    }

    #[test]
    fn test_zero_concurrency_is_rejected() {
        let config = ExporterConfig {
            max_concurrent_exports: 0,
            ..ExporterConfig::default()
        };
        assert!(matches!(config.validate(), Err(ExportError::Config(_))));
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let config = ExporterConfig {
            process_timeout_secs: Some(0),
            ..ExporterConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_file_round_trip_and_queue_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("atacut.toml");
        let config = ExporterConfig {
            temp_dir: Some(dir.path().to_path_buf()),
            process_timeout_secs: Some(90),
            ..ExporterConfig::default()
        };
        std::fs::write(&path, config.to_toml().unwrap()).unwrap();

        let loaded = ExporterConfig::load(Some(&path), &ConfigOverrides::default()).unwrap();
        assert_eq!(loaded.temp_dir, config.temp_dir);
        let settings = loaded.queue_settings();
        assert_eq!(settings.temp_root, dir.path());
        assert_eq!(loaded.process_timeout(), Some(Duration::from_secs(90)));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = ExporterConfig::load(
            Some(Path::new("/nonexistent/atacut.toml")),
            &ConfigOverrides::default(),
        );
        assert!(matches!(result, Err(ExportError::Config(_))));
    }
}
