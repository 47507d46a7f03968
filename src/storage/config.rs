//! Configuration handling for taskgraph
//!
//! Configuration is stored in `~/.config/taskgraph/config.toml` (or the
//! platform equivalent). Every section is optional.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// Where the task document is stored
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the key-value files (defaults to the platform data dir)
    pub data_dir: Option<PathBuf>,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `tracing` filter directive used when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

/// Output format for commands
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Output settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct OutputConfig {
    /// Format used when `--format` is not given
    pub default_format: OutputFormat,
}

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub log: LogConfig,
    pub output: OutputConfig,
}

impl Config {
    /// Loads configuration from the default location
    pub fn load() -> Result<Self> {
        match Self::global_config_dir() {
            Some(dir) => Self::load_from(&dir.join("config.toml")),
            None => Ok(Self::default()),
        }
    }

    /// Loads configuration from a file; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;

        Self::parse(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    /// Parses configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("dev", "taskgraph", "taskgraph")
    }

    /// Returns the global config directory
    pub fn global_config_dir() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Returns the configured data directory, or the platform default
    pub fn data_dir(&self) -> Option<PathBuf> {
        self.storage
            .data_dir
            .clone()
            .or_else(|| Self::project_dirs().map(|dirs| dirs.data_dir().to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config() {
        let config = Config::default();

        assert_eq!(config.log.level, "warn");
        assert_eq!(config.output.default_format, OutputFormat::Text);
        assert!(config.storage.data_dir.is_none());
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
[storage]
data_dir = "/tmp/tasks"

[log]
level = "debug"

[output]
default_format = "json"
"#;

        let config = Config::parse(toml).unwrap();
        assert_eq!(config.storage.data_dir, Some(PathBuf::from("/tmp/tasks")));
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.output.default_format, OutputFormat::Json);
        assert_eq!(config.data_dir(), Some(PathBuf::from("/tmp/tasks")));
    }

    #[test]
    fn parse_partial_config_uses_defaults() {
        let config = Config::parse("[output]\ndefault_format = \"json\"\n").unwrap();

        assert_eq!(config.output.default_format, OutputFormat::Json);
        assert_eq!(config.log.level, "warn");
    }

    #[test]
    fn parse_invalid_config() {
        let result = Config::parse("[output]\ndefault_format = \"yaml\"\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn load_missing_file_is_default() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config.log.level, "warn");
    }

    #[test]
    fn load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[log]\nlevel = \"info\"\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.log.level, "info");
    }
}
