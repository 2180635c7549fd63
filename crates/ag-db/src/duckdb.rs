//! DuckDB database backend implementation

use crate::error::{commit_error, DbError, DbResult};
use crate::traits::{Database, Transaction};
use duckdb::{params_from_iter, AccessMode, Config, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// DuckDB database backend
pub struct DuckDbBackend {
    conn: Mutex<Connection>,
}

impl DuckDbBackend {
    /// Create a new in-memory DuckDB connection
    pub fn in_memory() -> DbResult<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create a new DuckDB connection from a file path
    pub fn from_path(path: &Path) -> DbResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| DbError::ConnectionError(format!("{e}: {}", path.display())))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an existing DuckDB database file without write access.
    pub fn open_read_only(path: &Path) -> DbResult<Self> {
        let config = Config::default()
            .access_mode(AccessMode::ReadOnly)
            .map_err(|e| DbError::ConnectionError(e.to_string()))?;
        let conn = Connection::open_with_flags(path, config)
            .map_err(|e| DbError::ConnectionError(format!("{e}: {}", path.display())))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create from path string (handles :memory: special case)
    pub fn new(path: &str) -> DbResult<Self> {
        if path == ":memory:" {
            Self::in_memory()
        } else {
            Self::from_path(Path::new(path))
        }
    }

    fn lock(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| DbError::MutexPoisoned(e.to_string()))
    }
}

impl Database for DuckDbBackend {
    fn begin(&self) -> DbResult<Box<dyn Transaction + '_>> {
        let conn = self.lock()?;
        conn.execute_batch("BEGIN TRANSACTION")
            .map_err(|e| DbError::TransactionError(format!("BEGIN failed: {e}")))?;
        Ok(Box::new(DuckDbTransaction { conn, open: true }))
    }

    fn db_type(&self) -> &'static str {
        "duckdb"
    }
}

/// Transaction holding the DuckDB connection lock until it finishes.
struct DuckDbTransaction<'a> {
    conn: MutexGuard<'a, Connection>,
    open: bool,
}

impl DuckDbTransaction<'_> {
    fn query_strings(&mut self, sql: &str) -> DbResult<Vec<String>> {
        let mut stmt = self.conn.prepare(sql)?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }
}

impl Transaction for DuckDbTransaction<'_> {
    fn execute(&mut self, sql: &str, params: &[&str]) -> DbResult<usize> {
        Ok(self.conn.execute(sql, params_from_iter(params.iter()))?)
    }

    fn query_optional_string(&mut self, sql: &str, params: &[&str]) -> DbResult<Option<String>> {
        match self.conn.query_row(sql, params_from_iter(params.iter()), |row| {
            row.get::<_, Option<String>>(0)
        }) {
            Ok(value) => Ok(value),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn query_count(&mut self, sql: &str) -> DbResult<usize> {
        let count: i64 =
            self.conn
                .query_row(&format!("SELECT COUNT(*) FROM ({sql})"), [], |row| {
                    row.get(0)
                })?;
        Ok(count as usize)
    }

    fn table_names(&mut self) -> DbResult<Vec<String>> {
        self.query_strings(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_type = 'BASE TABLE' \
             ORDER BY table_name",
        )
    }

    fn index_names(&mut self) -> DbResult<Vec<String>> {
        self.query_strings(
            "SELECT index_name FROM duckdb_indexes() \
             WHERE schema_name = current_schema() \
             ORDER BY index_name",
        )
    }

    fn commit(mut self: Box<Self>) -> DbResult<()> {
        self.open = false;
        if let Err(commit_err) = self.conn.execute_batch("COMMIT") {
            let _ = self.conn.execute_batch("ROLLBACK");
            return Err(commit_error(commit_err.into()));
        }
        Ok(())
    }

    fn rollback(mut self: Box<Self>) -> DbResult<()> {
        self.open = false;
        self.conn
            .execute_batch("ROLLBACK")
            .map_err(|e| DbError::TransactionError(format!("ROLLBACK failed: {e}")))
    }
}

impl Drop for DuckDbTransaction<'_> {
    fn drop(&mut self) {
        if self.open {
            let _ = self.conn.execute_batch("ROLLBACK");
        }
    }
}

#[cfg(test)]
#[path = "duckdb_test.rs"]
mod tests;
