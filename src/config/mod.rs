//! Configuration management for takeout
//!
//! Configuration comes from a TOML file and command-line arguments.
//!
//! Configuration precedence (highest to lowest):
//! 1. Command-line arguments
//! 2. Configuration file
//! 3. Default values

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::export::writers::ExportFormat;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Export configuration
    #[serde(default)]
    pub export: ExportConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Export-related configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Directory that receives every export file
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Record file format (csv, json)
    #[serde(default)]
    pub format: ExportFormat,

    /// Dialogs requested per page
    #[serde(default = "default_page_limit")]
    pub dialog_page_limit: u32,

    /// Messages requested per history page
    #[serde(default = "default_page_limit")]
    pub history_page_limit: u32,

    /// Messages requested per saved-message search page
    #[serde(default = "default_page_limit")]
    pub saved_page_limit: u32,

    /// Profile photos requested per page
    #[serde(default = "default_page_limit")]
    pub photo_page_limit: u32,

    /// Stories requested per page
    #[serde(default = "default_page_limit")]
    pub story_page_limit: u32,

    /// Per-download timeout in seconds
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,

    /// Downloads allowed in flight across all jobs
    #[serde(default = "default_max_concurrent_downloads")]
    pub max_concurrent_downloads: usize,

    /// Largest file the session may export, in megabytes. Enables file export.
    #[serde(default)]
    pub file_max_size_mb: Option<u64>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// Enable timestamps in logs
    #[serde(default = "default_log_timestamps")]
    pub timestamps: bool,
}

/// Log level options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

// Default value functions
fn default_output_dir() -> PathBuf {
    PathBuf::from("takeout_export")
}

fn default_page_limit() -> u32 {
    100
}

fn default_download_timeout() -> u64 {
    30
}

fn default_max_concurrent_downloads() -> usize {
    4
}

fn default_log_level() -> LogLevel {
    LogLevel::Warn
}

fn default_log_timestamps() -> bool {
    true
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            format: ExportFormat::default(),
            dialog_page_limit: default_page_limit(),
            history_page_limit: default_page_limit(),
            saved_page_limit: default_page_limit(),
            photo_page_limit: default_page_limit(),
            story_page_limit: default_page_limit(),
            download_timeout_secs: default_download_timeout(),
            max_concurrent_downloads: default_max_concurrent_downloads(),
            file_max_size_mb: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            timestamps: default_log_timestamps(),
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()).into());
        }
        let raw = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&raw).map_err(|e| ConfigError::InvalidFormat(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `path`, or from the default location
    ///
    /// An explicit path must exist. A missing default file yields the defaults.
    pub fn load_from_file(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default_path = Self::default_path();
                if default_path.exists() {
                    Self::from_file(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".takeout")
            .join("config.toml")
    }

    /// Save configuration to a file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let raw = toml::to_string_pretty(self).map_err(|e| ConfigError::Generic(e.to_string()))?;
        std::fs::write(path, raw)?;
        Ok(())
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Generic(e.to_string()).into())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let limits = [
            ("export.dialog_page_limit", self.export.dialog_page_limit),
            ("export.history_page_limit", self.export.history_page_limit),
            ("export.saved_page_limit", self.export.saved_page_limit),
            ("export.photo_page_limit", self.export.photo_page_limit),
            ("export.story_page_limit", self.export.story_page_limit),
        ];
        for (field, value) in limits {
            if value == 0 {
                return Err(invalid(field, value));
            }
        }
        if self.export.download_timeout_secs == 0 {
            return Err(invalid("export.download_timeout_secs", 0));
        }
        if self.export.max_concurrent_downloads == 0 {
            return Err(invalid("export.max_concurrent_downloads", 0));
        }
        if self.export.file_max_size_mb == Some(0) {
            return Err(invalid("export.file_max_size_mb", 0));
        }
        if self.export.output_dir.as_os_str().is_empty() {
            return Err(invalid("export.output_dir", "\"\""));
        }
        Ok(())
    }
}

fn invalid(field: &str, value: impl ToString) -> crate::error::TakeoutError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
    .into()
}

impl ExportConfig {
    /// Get the download timeout as Duration
    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    /// File size cap in bytes
    pub fn file_max_size_bytes(&self) -> Option<u64> {
        self.file_max_size_mb.map(|mb| mb * 1024 * 1024)
    }
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.export.format, ExportFormat::Csv);
        assert_eq!(config.export.dialog_page_limit, 100);
        assert_eq!(config.export.download_timeout(), Duration::from_secs(30));
        assert_eq!(config.logging.level, LogLevel::Warn);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[export]\nformat = \"json\"\nfile_max_size_mb = 8\n\n[logging]\nlevel = \"debug\"\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.export.format, ExportFormat::Json);
        assert_eq!(config.export.file_max_size_bytes(), Some(8 * 1024 * 1024));
        assert_eq!(config.export.history_page_limit, 100);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert!(config.logging.timestamps);
    }

    #[test]
    fn test_save_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.export.max_concurrent_downloads = 9;

        config.save(&path).unwrap();
        assert_eq!(Config::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_validation_rejects_zero_limits() {
        let mut config = Config::default();
        config.export.saved_page_limit = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.export.max_concurrent_downloads = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_explicit_file() {
        let err = Config::load_from_file(Some(Path::new("/nonexistent/takeout.toml"))).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }
}
