//! Configuration management for csvexport
//!
//! This module handles loading, parsing, and managing configuration from various sources:
//! - Configuration files (TOML format)
//! - Environment variables
//! - Command-line arguments
//!
//! Configuration precedence (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file
//! 4. Default values

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{ConfigError, Result};
use crate::export::{CsvDialect, LineTerminator, SourceDefaults, DEFAULT_BATCH_SIZE, DEFAULT_ROW_CAP};

/// Prefix of the environment variables read by [`Config::apply_env`]
pub const ENV_PREFIX: &str = "CSVEXPORT_";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Export defaults and CSV dialect
    #[serde(default)]
    pub export: ExportSection,

    /// Storage disks and temp directory
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// `[export]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportSection {
    /// Rows fetched and written per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum data rows per export; 0 means no cap
    #[serde(default = "default_row_cap")]
    pub row_cap: usize,

    /// Whether the row cap is applied at all
    #[serde(default = "default_row_cap_enabled")]
    pub row_cap_enabled: bool,

    /// Prefix output with a UTF-8 byte-order mark
    #[serde(default)]
    pub bom: bool,

    #[serde(default = "default_delimiter")]
    pub delimiter: String,

    #[serde(default = "default_enclosure")]
    pub enclosure: String,

    /// Escape character; empty disables escaping
    #[serde(default = "default_escape")]
    pub escape: String,

    #[serde(default)]
    pub line_terminator: LineTerminator,

    /// Show a progress spinner during exports
    #[serde(default)]
    pub progress: bool,
}

/// `[storage]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageConfig {
    /// Directory for temporary export files (system temp dir if unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<PathBuf>,

    /// Named local disks
    #[serde(default = "default_disks")]
    pub disks: BTreeMap<String, DiskConfig>,
}

/// `[storage.disks.<name>]` entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiskConfig {
    /// Root directory of the disk
    pub root: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
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
fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_row_cap() -> usize {
    DEFAULT_ROW_CAP
}

fn default_row_cap_enabled() -> bool {
    true
}

fn default_delimiter() -> String {
    ",".to_string()
}

fn default_enclosure() -> String {
    "\"".to_string()
}

fn default_escape() -> String {
    "\\".to_string()
}

fn default_disks() -> BTreeMap<String, DiskConfig> {
    let mut disks = BTreeMap::new();
    disks.insert(crate::export::DEFAULT_DISK.to_string(), default_local_disk());
    disks
}

fn default_local_disk() -> DiskConfig {
    DiskConfig {
        root: Config::base_dir().join("storage"),
    }
}

fn default_log_level() -> LogLevel {
    LogLevel::Warn
}

fn default_log_timestamps() -> bool {
    true
}

impl Default for ExportSection {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            row_cap: default_row_cap(),
            row_cap_enabled: default_row_cap_enabled(),
            bom: false,
            delimiter: default_delimiter(),
            enclosure: default_enclosure(),
            escape: default_escape(),
            line_terminator: LineTerminator::default(),
            progress: false,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            temp_dir: None,
            disks: default_disks(),
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

    /// Directory holding the config file and default storage
    pub fn base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".csvexport")
    }

    /// Get the default configuration file path
    ///
    /// # Returns
    /// * `PathBuf` - Path to default configuration file
    pub fn default_path() -> PathBuf {
        Self::base_dir().join("config.toml")
    }

    /// Load configuration from a file
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file (TOML format)
    ///
    /// # Returns
    /// * `Result<Config>` - Loaded configuration or error
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound(path.display().to_string())
            } else {
                ConfigError::InvalidFormat(format!("{}: {}", path.display(), e))
            }
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    ///
    /// The `local` disk is always available, even when the file declares
    /// other disks.
    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(content).map_err(|e| ConfigError::InvalidFormat(e.to_string()))?;
        config.storage.ensure_default_disk();
        Ok(config)
    }

    /// Load configuration from file and environment with proper precedence
    ///
    /// An explicit `path` must exist; the default path is optional.
    ///
    /// # Returns
    /// * `Result<Config>` - Merged configuration or error
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Self::default_path();
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_env(
            std::env::vars_os()
                .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?))),
        )?;
        Ok(config)
    }

    /// Apply `CSVEXPORT_*` variables on top of this configuration
    ///
    /// Example: `CSVEXPORT_BATCH_SIZE=500`, `CSVEXPORT_ESCAPE=` (disable escaping)
    ///
    /// # Arguments
    /// * `vars` - Environment entries; unrelated names are ignored
    pub fn apply_env<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (name, value) in vars {
            let Some(key) = name.strip_prefix(ENV_PREFIX) else {
                continue;
            };

            match key {
                "BATCH_SIZE" => self.export.batch_size = parse_env(&name, &value)?,
                "ROW_CAP" => self.export.row_cap = parse_env(&name, &value)?,
                "ROW_CAP_ENABLED" => self.export.row_cap_enabled = parse_env(&name, &value)?,
                "BOM" => self.export.bom = parse_env(&name, &value)?,
                "DELIMITER" => self.export.delimiter = value,
                "ENCLOSURE" => self.export.enclosure = value,
                "ESCAPE" => self.export.escape = value,
                "LINE_TERMINATOR" => {
                    self.export.line_terminator = match value.to_ascii_lowercase().as_str() {
                        "lf" => LineTerminator::Lf,
                        "crlf" => LineTerminator::CrLf,
                        _ => return Err(invalid(&name, &value)),
                    }
                }
                "PROGRESS" => self.export.progress = parse_env(&name, &value)?,
                "TEMP_DIR" => self.storage.temp_dir = Some(PathBuf::from(value)),
                "LOG_LEVEL" => self.logging.level = parse_env(&name, &value)?,
                _ => {}
            }
        }
        Ok(())
    }

    /// Save configuration to a file
    ///
    /// # Arguments
    /// * `path` - Path where to save the configuration
    ///
    /// # Returns
    /// * `Result<()>` - Success or error
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    /// Validate the configuration
    ///
    /// # Returns
    /// * `Result<()>` - Ok if valid, error otherwise
    pub fn validate(&self) -> Result<()> {
        if self.export.batch_size == 0 {
            return Err(invalid("export.batch_size", "0"));
        }
        self.export.dialect()?;

        for (name, disk) in &self.storage.disks {
            if disk.root.as_os_str().is_empty() {
                return Err(invalid(&format!("storage.disks.{name}.root"), ""));
            }
        }
        Ok(())
    }
}

impl ExportSection {
    /// CSV dialect described by this section
    pub fn dialect(&self) -> Result<CsvDialect> {
        let escape = if self.escape.is_empty() {
            None
        } else {
            Some(single_byte("export.escape", &self.escape)?)
        };

        let dialect = CsvDialect::default()
            .with_delimiter(single_byte("export.delimiter", &self.delimiter)?)
            .with_enclosure(single_byte("export.enclosure", &self.enclosure)?)
            .with_escape(escape)
            .with_terminator(self.line_terminator);
        dialect.validate()?;
        Ok(dialect)
    }

    /// Defaults given to sources that take their settings from configuration
    pub fn source_defaults(&self) -> SourceDefaults {
        SourceDefaults::default()
            .with_batch_size(self.batch_size)
            .with_row_cap((self.row_cap > 0).then_some(self.row_cap))
            .with_row_cap_enabled(self.row_cap_enabled)
            .with_bom(self.bom)
    }
}

impl StorageConfig {
    /// Directory used for temporary export files
    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Add the `local` disk unless it is configured already
    pub fn ensure_default_disk(&mut self) {
        self.disks
            .entry(crate::export::DEFAULT_DISK.to_string())
            .or_insert_with(default_local_disk);
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

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

fn invalid(field: &str, value: &str) -> crate::error::ExportError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
    .into()
}

fn parse_env<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| invalid(name, value))
}

/// Dialect characters must be exactly one ASCII byte
fn single_byte(field: &str, value: &str) -> Result<u8> {
    match value.as_bytes() {
        [byte] if byte.is_ascii() => Ok(*byte),
        _ => Err(invalid(field, value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExportError;

    fn env(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.export.batch_size, 1000);
        assert_eq!(config.export.row_cap, 10_000);
        assert!(config.export.row_cap_enabled);
        assert!(!config.export.bom);
        assert!(config.storage.disks.contains_key("local"));
        assert_eq!(config.logging.level, LogLevel::Warn);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [export]
            batch_size = 250
            delimiter = ";"
            line_terminator = "crlf"

            [storage.disks.archive]
            root = "/srv/archive"
            "#,
        )
        .unwrap();

        assert_eq!(config.export.batch_size, 250);
        assert_eq!(config.export.row_cap, 10_000);
        assert_eq!(config.export.line_terminator, LineTerminator::CrLf);
        assert_eq!(
            config.storage.disks["archive"].root,
            PathBuf::from("/srv/archive")
        );

        let dialect = config.export.dialect().unwrap();
        assert_eq!(dialect.delimiter, b';');
        assert_eq!(dialect.terminator, LineTerminator::CrLf);
    }

    #[test]
    fn test_invalid_toml() {
        let err = Config::from_toml("[export\nbatch_size = ").unwrap_err();
        assert!(matches!(
            err,
            ExportError::Config(ConfigError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = Config::from_file("/nonexistent/csvexport.toml").unwrap_err();
        assert!(matches!(
            err,
            ExportError::Config(ConfigError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env(env(&[
                ("CSVEXPORT_BATCH_SIZE", "50"),
                ("CSVEXPORT_ROW_CAP", "0"),
                ("CSVEXPORT_BOM", "true"),
                ("CSVEXPORT_ESCAPE", ""),
                ("CSVEXPORT_LINE_TERMINATOR", "CRLF"),
                ("CSVEXPORT_LOG_LEVEL", "debug"),
                ("HOME", "/root"),
            ]))
            .unwrap();

        assert_eq!(config.export.batch_size, 50);
        assert!(config.export.bom);
        assert_eq!(config.export.line_terminator, LineTerminator::CrLf);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.export.dialect().unwrap().escape, None);

        let defaults = config.export.source_defaults();
        assert_eq!(defaults.batch_size, 50);
        assert_eq!(defaults.row_cap, None);
        assert!(defaults.bom_enabled);
    }

    #[test]
    fn test_env_rejects_garbage() {
        let mut config = Config::default();
        let err = config
            .apply_env(env(&[("CSVEXPORT_BATCH_SIZE", "lots")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ExportError::Config(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_bad_dialect() {
        let mut config = Config::default();
        config.export.delimiter = "||".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.export.enclosure = ",".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.export.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = Config::default();
        config.export.bom = true;
        config.storage.temp_dir = Some(PathBuf::from("/tmp/csv"));

        let text = config.to_toml().unwrap();
        assert!(text.contains("[export]"));
        assert_eq!(Config::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn test_custom_disks_keep_local() {
        let config = Config::from_toml(
            r#"
            [storage.disks.reports]
            root = "/srv/reports"
            "#,
        )
        .unwrap();

        let names: Vec<&str> = config.storage.disks.keys().map(String::as_str).collect();
        assert_eq!(names, ["local", "reports"]);
        assert_eq!(
            config.storage.disks["local"],
            Config::default().storage.disks["local"]
        );

        let config = Config::from_toml(
            r#"
            [storage.disks.local]
            root = "/data/local"
            "#,
        )
        .unwrap();
        assert_eq!(config.storage.disks["local"].root, PathBuf::from("/data/local"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf/config.toml");

        let mut config = Config::default();
        config.export.row_cap = 42;
        config.save(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.export.row_cap, 42);
    }

    #[test]
    fn test_log_level_parsing() {
        assert_eq!("INFO".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert!("loud".parse::<LogLevel>().is_err());
        assert_eq!(LogLevel::Trace.to_tracing_level(), tracing::Level::TRACE);
    }
}
