//! Configuration for the `caseschema` tool, read from `caseschema.yaml`.
//!
//! ```yaml
//! schemas:
//!   directory: config/schemas
//! output:
//!   pretty: false
//! log_filter: info
//! ```
//!
//! `CASESCHEMA_SCHEMA_DIR` and `CASESCHEMA_LOG` override the file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const SCHEMA_DIR_ENV: &str = "CASESCHEMA_SCHEMA_DIR";
pub const LOG_ENV: &str = "CASESCHEMA_LOG";

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    #[serde(default)]
    pub schemas: SchemaSource,
    #[serde(default)]
    pub output: OutputOptions,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

/// Where schema documents are loaded from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaSource {
    #[serde(default = "default_schema_dir")]
    pub directory: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputOptions {
    /// Write a pretty-printed JSON array instead of NDJSON
    #[serde(default)]
    pub pretty: bool,
}

fn default_schema_dir() -> PathBuf {
    PathBuf::from("config/schemas")
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for SchemaSource {
    fn default() -> Self {
        Self {
            directory: default_schema_dir(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        let config = Self {
            schemas: SchemaSource::default(),
            output: OutputOptions::default(),
            log_filter: default_log_filter(),
        };
        config.apply_env()
    }
}

impl ModelConfig {
    /// Load configuration from a YAML file. Environment overrides are not
    /// applied; see [`ModelConfig::apply_env`].
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Apply `CASESCHEMA_SCHEMA_DIR` and `CASESCHEMA_LOG`.
    pub fn apply_env(self) -> Self {
        self.with_overrides(
            std::env::var(SCHEMA_DIR_ENV).ok(),
            std::env::var(LOG_ENV).ok(),
        )
    }

    fn with_overrides(mut self, schema_dir: Option<String>, log_filter: Option<String>) -> Self {
        if let Some(dir) = schema_dir.filter(|d| !d.is_empty()) {
            self.schemas.directory = PathBuf::from(dir);
        }
        if let Some(filter) = log_filter.filter(|f| !f.is_empty()) {
            self.log_filter = filter;
        }
        self
    }
}
