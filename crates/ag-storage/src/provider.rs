//! Storage provider facade.
//!
//! [`StorageProvider`] is what the gateway opens at startup. Opening it runs
//! the schema upgrade, so a provider that exists is a provider whose schema
//! is current. A failed open must abort startup.

use crate::error::{StorageError, StorageResult};
use crate::migration::{current_version, upgrade, UpgradeReport};
use crate::registry::MigrationRegistry;
use crate::version::{config_value, set_config_value};
use ag_core::{SchemaVersion, StorageConfig};
use ag_db::{connect, Capabilities, Database, SqliteBackend, Transaction};
use std::sync::Arc;

/// Migrated storage shared by the gateway's services.
pub struct StorageProvider {
    db: Arc<dyn Database>,
    registry: MigrationRegistry,
    startup_report: UpgradeReport,
}

impl std::fmt::Debug for StorageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageProvider")
            .field("backend", &self.backend())
            .field("startup_report", &self.startup_report)
            .finish_non_exhaustive()
    }
}

impl StorageProvider {
    /// Open the configured backend and bring its schema up to date.
    pub fn open(config: &StorageConfig) -> StorageResult<Self> {
        let db = connect(config).map_err(StorageError::Connection)?;
        Self::from_database(db, MigrationRegistry::builtin())
    }

    /// In-memory SQLite storage with the built-in schema applied.
    ///
    /// Useful for unit tests that don't need persistence.
    pub fn open_memory() -> StorageResult<Self> {
        let db = SqliteBackend::in_memory().map_err(StorageError::Connection)?;
        Self::from_database(Arc::new(db), MigrationRegistry::builtin())
    }

    /// Wrap an already open database and migrate it with `registry`.
    pub fn from_database(db: Arc<dyn Database>, registry: MigrationRegistry) -> StorageResult<Self> {
        let startup_report = upgrade(db.as_ref(), &registry)?;
        Ok(Self {
            db,
            registry,
            startup_report,
        })
    }

    /// Run the upgrade again, applying anything registered since the last run.
    ///
    /// Safe to call repeatedly; an up-to-date schema yields a no-op report.
    pub fn ensure_schema_up_to_date(&self) -> StorageResult<UpgradeReport> {
        upgrade(self.db.as_ref(), &self.registry)
    }

    /// The persisted schema version.
    pub fn schema_version(&self) -> StorageResult<SchemaVersion> {
        current_version(self.db.as_ref())
    }

    /// The latest version the registry defines.
    pub fn latest_version(&self) -> SchemaVersion {
        self.registry.latest_version()
    }

    /// Versions registered above the persisted one.
    pub fn pending_versions(&self) -> StorageResult<Vec<SchemaVersion>> {
        Ok(self.registry.pending_after(self.schema_version()?))
    }

    /// What the upgrade run during open did.
    pub fn startup_report(&self) -> &UpgradeReport {
        &self.startup_report
    }

    /// The shared database handle.
    pub fn db(&self) -> &Arc<dyn Database> {
        &self.db
    }

    /// Backend identity
    pub fn backend(&self) -> &'static str {
        self.db.db_type()
    }

    /// Dialect features of the open backend.
    pub fn capabilities(&self) -> Capabilities {
        Capabilities::for_backend(self.backend())
    }

    /// The registry this provider migrates with.
    pub fn registry(&self) -> &MigrationRegistry {
        &self.registry
    }

    /// Execute `body` within a transaction, committing on success and rolling
    /// back on error.
    pub fn transaction<F, T>(&self, body: F) -> StorageResult<T>
    where
        F: FnOnce(&mut dyn Transaction) -> StorageResult<T>,
    {
        let mut tx = self.db.begin().map_err(StorageError::Transaction)?;

        match body(tx.as_mut()) {
            Ok(value) => {
                tx.commit().map_err(StorageError::Transaction)?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback() {
                    log::warn!("rollback failed: {rollback_err}");
                }
                Err(err)
            }
        }
    }

    /// Read a setting from the `config` table.
    pub fn config_value(&self, category: &str, key: &str) -> StorageResult<Option<String>> {
        self.transaction(|tx| config_value(tx, category, key).map_err(StorageError::Query))
    }

    /// Write a setting to the `config` table.
    pub fn set_config_value(&self, category: &str, key: &str, value: &str) -> StorageResult<()> {
        self.transaction(|tx| set_config_value(tx, category, key, value).map_err(StorageError::Query))
    }

    /// Base tables present in the database, sorted.
    pub fn table_names(&self) -> StorageResult<Vec<String>> {
        self.db.table_names().map_err(StorageError::Introspection)
    }

    /// User-defined indexes present in the database, sorted.
    pub fn index_names(&self) -> StorageResult<Vec<String>> {
        self.db.index_names().map_err(StorageError::Introspection)
    }
}

#[cfg(test)]
#[path = "provider_test.rs"]
mod tests;
