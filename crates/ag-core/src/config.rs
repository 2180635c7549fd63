//! Configuration types and parsing for authgate.yml
//!
//! Only the storage section is modelled here; the authentication handlers
//! and listener settings live with the services that consume them.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable that overrides `storage.path` when no CLI flag is given.
pub const STORAGE_PATH_ENV: &str = "AUTHGATE_STORAGE_PATH";

/// Main gateway configuration from authgate.yml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Deployment name, used in log output
    pub name: String,

    /// Durable storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Storage backend selector
///
/// The lowercase name doubles as the backend identity handed to the
/// capability descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DbType {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// DuckDB
    DuckDb,
}

impl DbType {
    /// Backend identity string.
    pub fn as_str(&self) -> &'static str {
        match self {
            DbType::Sqlite => "sqlite",
            DbType::DuckDb => "duckdb",
        }
    }
}

impl std::fmt::Display for DbType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Backend type (sqlite or duckdb)
    #[serde(rename = "type", default)]
    pub db_type: DbType,

    /// Database path (file path or :memory:)
    #[serde(default = "default_db_path")]
    pub path: String,

    /// How long a SQLite connection waits on a locked database before failing.
    ///
    /// Migrations inherit this as their only deadline.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_type: DbType::default(),
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl StorageConfig {
    /// Whether the configured path is an in-memory database
    pub fn is_memory(&self) -> bool {
        self.path == MEMORY_PATH
    }
}

/// Path value that selects an in-memory database.
pub const MEMORY_PATH: &str = ":memory:";

fn default_db_path() -> String {
    MEMORY_PATH.to_string()
}

const fn default_busy_timeout_ms() -> u64 {
    5_000
}

impl Config {
    /// Load configuration from a file path
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Err(CoreError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        let config = Self::parse(&content)?;
        log::debug!("Loaded config '{}' from {}", config.name, path.display());
        Ok(config)
    }

    /// Load configuration from a directory
    /// Looks for authgate.yml or authgate.yaml
    pub fn load_from_dir(dir: &Path) -> CoreResult<Self> {
        let yml_path = dir.join("authgate.yml");
        let yaml_path = dir.join("authgate.yaml");

        if yml_path.exists() {
            Self::load(&yml_path)
        } else if yaml_path.exists() {
            Self::load(&yaml_path)
        } else {
            Err(CoreError::ConfigNotFound {
                path: yml_path.display().to_string(),
            })
        }
    }

    /// Parse and validate configuration from YAML text
    pub fn parse(content: &str) -> CoreResult<Self> {
        let config: Config = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    fn validate(&self) -> CoreResult<()> {
        if self.name.is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: "Gateway name cannot be empty".to_string(),
            });
        }

        if self.storage.path.trim().is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: "storage.path cannot be empty (use \":memory:\" for an in-memory database)"
                    .to_string(),
            });
        }

        Ok(())
    }

    /// Resolve the storage path override.
    ///
    /// Precedence: CLI flag > `AUTHGATE_STORAGE_PATH` env var > None (use config).
    pub fn resolve_storage_path(cli_path: Option<&str>) -> Option<String> {
        cli_path
            .map(String::from)
            .or_else(|| std::env::var(STORAGE_PATH_ENV).ok())
            .filter(|p| !p.is_empty())
    }

    /// Storage configuration with an optional path override applied
    pub fn storage_with_override(&self, path_override: Option<&str>) -> StorageConfig {
        let mut storage = self.storage.clone();
        if let Some(path) = Self::resolve_storage_path(path_override) {
            storage.path = path;
        }
        storage
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
