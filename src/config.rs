//! # Configuration
//!
//! padwatch reads a single TOML file, by default
//! `~/.config/padwatch/config.toml`. The `PADWATCH_CONFIG` environment
//! variable points it somewhere else. Every key is optional:
//!
//! ```toml
//! log_level = "info"
//! backoff_secs = 5
//!
//! [classifier]
//! allow = ["Wireless Controller", "Stadia"]
//! deny = ["Wireless Controller Touchpad", "Wireless Controller Motion Sensors"]
//! ```
//!
//! A missing file means defaults. A file that exists but does not parse is
//! a startup error rather than a silent fallback, so a typo in a pattern list
//! does not quietly change which devices are watched.

use crate::controller::{ClassifierConfig, WatcherSettings};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tokio::fs::{create_dir_all, read_to_string, try_exists, write};
use tracing::{warn, Level};

const CONFIG_DIR: &str = ".config/padwatch";
const CONFIG_FILE: &str = "config.toml";
const CONFIG_PATH_ENV: &str = "PADWATCH_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Failed to write {path}: {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize configuration: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Unknown log level: {0}")]
    InvalidLogLevel(String),
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Maximum tracing level (`error`, `warn`, `info`, `debug`, `trace`)
    pub log_level: String,
    /// Seconds between discovery attempts while no gamepad is connected
    pub backoff_secs: u64,
    /// Device name patterns
    pub classifier: ClassifierConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            backoff_secs: 5,
            classifier: ClassifierConfig::default(),
        }
    }
}

impl Config {
    /// Location of the config file, honouring `PADWATCH_CONFIG`.
    pub fn config_path() -> PathBuf {
        if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
            return PathBuf::from(path);
        }

        let mut path = get_home_dir();
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        path
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Loads the file at `path`. `Ok(None)` if it does not exist.
    pub async fn load(path: &Path) -> Result<Option<Self>, ConfigError> {
        let exists = try_exists(path)
            .await
            .map_err(|source| ConfigError::ReadError {
                path: path.to_path_buf(),
                source,
            })?;
        if !exists {
            return Ok(None);
        }

        let content = read_to_string(path)
            .await
            .map_err(|source| ConfigError::ReadError {
                path: path.to_path_buf(),
                source,
            })?;

        Self::from_toml(&content)
            .map(Some)
            .map_err(|source| ConfigError::ParseError {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Writes this configuration to `path`, creating parent directories.
    pub async fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            create_dir_all(parent)
                .await
                .map_err(|source| ConfigError::WriteError {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let content = toml::to_string_pretty(self)?;
        write(path, content)
            .await
            .map_err(|source| ConfigError::WriteError {
                path: path.to_path_buf(),
                source,
            })
    }

    pub fn log_level(&self) -> Result<Level, ConfigError> {
        Level::from_str(self.log_level.trim())
            .map_err(|_| ConfigError::InvalidLogLevel(self.log_level.clone()))
    }

    pub fn watcher_settings(&self) -> WatcherSettings {
        WatcherSettings {
            backoff: Duration::from_secs(self.backoff_secs),
            classifier: self.classifier.clone(),
        }
    }
}

fn get_home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| {
        warn!("Could not determine home directory, using current directory");
        PathBuf::from(".")
    })
}
