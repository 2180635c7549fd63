//! Runtime context for CLI commands

use anyhow::{Context, Result};
use ag_core::{Config, StorageConfig};
use ag_storage::StorageProvider;
use std::path::Path;

use crate::cli::GlobalArgs;

/// Loaded configuration with CLI overrides applied
#[derive(Debug)]
pub(crate) struct RuntimeContext {
    /// The loaded configuration
    pub config: Config,

    /// Storage settings after the `--database` / env override
    pub storage: StorageConfig,
}

impl RuntimeContext {
    /// Create a new runtime context from global arguments
    pub fn new(args: &GlobalArgs) -> Result<Self> {
        // Load config from custom path or project directory
        let config = if let Some(config_path) = &args.config {
            Config::load(Path::new(config_path)).context("Failed to load configuration file")?
        } else {
            Config::load_from_dir(Path::new(&args.project_dir))
                .context("Failed to load configuration")?
        };

        let storage = config.storage_with_override(args.database.as_deref());
        log::debug!(
            "{}: {} storage at {}",
            config.name,
            storage.db_type,
            storage.path
        );

        Ok(Self { config, storage })
    }

    /// Open storage, migrating it to the latest schema version.
    pub fn open_storage(&self) -> Result<StorageProvider> {
        StorageProvider::open(&self.storage).with_context(|| {
            format!(
                "Failed to open {} storage at {}",
                self.storage.db_type, self.storage.path
            )
        })
    }
}

#[cfg(test)]
#[path = "context_test.rs"]
mod tests;
