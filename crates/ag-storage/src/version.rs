//! Persisted schema version record.
//!
//! The current version lives in the key/value `config` table as the row
//! `("schema", "version", "<n>")`. It is the single source of truth for how
//! far a database has been migrated.

use crate::error::{StorageError, StorageResult};
use ag_core::SchemaVersion;
use ag_db::{DbResult, Transaction};

/// Key/value settings table, including the schema version record.
pub const CONFIG_TABLE: &str = "config";

/// Category of the version record.
pub const SCHEMA_CATEGORY: &str = "schema";
/// Key of the version record.
pub const VERSION_KEY: &str = "version";

/// Prefix of the event logged each time a version is finalized.
pub const SCHEMA_UPGRADE_MESSAGE: &str = "storage schema upgraded to version ";

/// `key_name` rather than `key`: the latter is reserved in MySQL.
const CREATE_CONFIG_TABLE: &str = "CREATE TABLE IF NOT EXISTS config (\
     category VARCHAR(32) NOT NULL, \
     key_name VARCHAR(32) NOT NULL, \
     value TEXT, \
     PRIMARY KEY (category, key_name))";

const SELECT_CONFIG_VALUE: &str = "SELECT value FROM config WHERE category = ? AND key_name = ?";
const UPDATE_CONFIG_VALUE: &str = "UPDATE config SET value = ? WHERE category = ? AND key_name = ?";
const INSERT_CONFIG_VALUE: &str = "INSERT INTO config (category, key_name, value) VALUES (?, ?, ?)";

/// Create the `config` table if it does not exist yet.
pub fn ensure_config_table(tx: &mut dyn Transaction) -> DbResult<()> {
    tx.execute(CREATE_CONFIG_TABLE, &[])?;
    Ok(())
}

/// Read a value from the `config` table.
pub fn config_value(
    tx: &mut dyn Transaction,
    category: &str,
    key: &str,
) -> DbResult<Option<String>> {
    tx.query_optional_string(SELECT_CONFIG_VALUE, &[category, key])
}

/// Write a value to the `config` table, replacing any previous value.
///
/// Update-then-insert rather than a dialect-specific upsert so the same
/// statements work on every backend.
pub fn set_config_value(
    tx: &mut dyn Transaction,
    category: &str,
    key: &str,
    value: &str,
) -> DbResult<()> {
    let updated = tx.execute(UPDATE_CONFIG_VALUE, &[value, category, key])?;
    if updated == 0 {
        tx.execute(INSERT_CONFIG_VALUE, &[category, key, value])?;
    }
    Ok(())
}

/// Read the persisted schema version.
///
/// A database without the `config` table, or without the version row, is at
/// version 0. `existing_tables` must come from the same transaction.
pub fn read_version(
    tx: &mut dyn Transaction,
    existing_tables: &[String],
) -> StorageResult<SchemaVersion> {
    if !existing_tables.iter().any(|t| t == CONFIG_TABLE) {
        return Ok(SchemaVersion::ZERO);
    }

    match config_value(tx, SCHEMA_CATEGORY, VERSION_KEY).map_err(StorageError::VersionRead)? {
        None => Ok(SchemaVersion::ZERO),
        Some(value) => {
            SchemaVersion::parse(&value).map_err(|_| StorageError::CorruptVersion { value })
        }
    }
}

/// Record `version` as reached and log it.
///
/// Must be the last write of a step's transaction so that a rollback of
/// anything earlier also rolls back the version bump.
pub fn finalize(tx: &mut dyn Transaction, version: SchemaVersion) -> StorageResult<()> {
    set_config_value(tx, SCHEMA_CATEGORY, VERSION_KEY, &version.to_string())
        .map_err(|source| StorageError::Finalization { version, source })?;

    log::debug!("{SCHEMA_UPGRADE_MESSAGE}{version}");

    Ok(())
}

#[cfg(test)]
#[path = "version_test.rs"]
mod tests;
