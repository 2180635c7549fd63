//! Open the configured storage backend.

use crate::duckdb::DuckDbBackend;
use crate::error::DbResult;
use crate::sqlite::SqliteBackend;
use crate::traits::Database;
use crate::error::DbError;
use ag_core::{DbType, StorageConfig};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Open a connection to the backend named in `config`.
pub fn connect(config: &StorageConfig) -> DbResult<Arc<dyn Database>> {
    log::debug!("Opening {} storage at {}", config.db_type, config.path);
    let db: Arc<dyn Database> = match config.db_type {
        DbType::Sqlite => Arc::new(SqliteBackend::new(
            &config.path,
            Duration::from_millis(config.busy_timeout_ms),
        )?),
        DbType::DuckDb => Arc::new(DuckDbBackend::new(&config.path)?),
    };
    Ok(db)
}

/// Open the backend named in `config` for inspection only.
///
/// Unlike [`connect`], never creates a database file: a missing path is a
/// [`DbError::ConnectionError`].
pub fn connect_read_only(config: &StorageConfig) -> DbResult<Arc<dyn Database>> {
    if config.path == ":memory:" {
        return connect(config);
    }
    let path = Path::new(&config.path);
    if !path.exists() {
        return Err(DbError::ConnectionError(format!(
            "no {} database at {}",
            config.db_type,
            path.display()
        )));
    }
    log::debug!("Opening {} storage at {} read-only", config.db_type, config.path);
    let db: Arc<dyn Database> = match config.db_type {
        DbType::Sqlite => Arc::new(SqliteBackend::open_read_only(
            path,
            Duration::from_millis(config.busy_timeout_ms),
        )?),
        DbType::DuckDb => Arc::new(DuckDbBackend::open_read_only(path)?),
    };
    Ok(db)
}
