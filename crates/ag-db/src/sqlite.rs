//! SQLite database backend implementation

use crate::error::{commit_error, DbError, DbResult};
use crate::traits::{Database, Transaction};
use rusqlite::{params_from_iter, Connection, OpenFlags};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// SQLite database backend
pub struct SqliteBackend {
    conn: Mutex<Connection>,
    read_only: bool,
}

impl SqliteBackend {
    /// Create a new in-memory SQLite connection
    pub fn in_memory() -> DbResult<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
            read_only: false,
        })
    }

    /// Open (or create) a SQLite database file.
    ///
    /// `busy_timeout` bounds how long a statement waits on a lock held by
    /// another connection, including a peer process migrating the same file.
    pub fn from_path(path: &Path, busy_timeout: Duration) -> DbResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| DbError::ConnectionError(format!("{e}: {}", path.display())))?;
        Self::with_busy_timeout(conn, busy_timeout, false)
    }

    /// Open an existing SQLite database file without write access.
    ///
    /// Fails instead of creating the file when `path` does not exist.
    pub fn open_read_only(path: &Path, busy_timeout: Duration) -> DbResult<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags)
            .map_err(|e| DbError::ConnectionError(format!("{e}: {}", path.display())))?;
        Self::with_busy_timeout(conn, busy_timeout, true)
    }

    fn with_busy_timeout(
        conn: Connection,
        busy_timeout: Duration,
        read_only: bool,
    ) -> DbResult<Self> {
        conn.busy_timeout(busy_timeout)
            .map_err(|e| DbError::ConnectionError(format!("busy_timeout: {e}")))?;
        Ok(Self {
            conn: Mutex::new(conn),
            read_only,
        })
    }

    /// Create from path string (handles :memory: special case)
    pub fn new(path: &str, busy_timeout: Duration) -> DbResult<Self> {
        if path == ":memory:" {
            Self::in_memory()
        } else {
            Self::from_path(Path::new(path), busy_timeout)
        }
    }

    fn lock(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| DbError::MutexPoisoned(e.to_string()))
    }
}

impl Database for SqliteBackend {
    /// Begins with `BEGIN IMMEDIATE` so the write lock is taken up front and
    /// concurrent migrators serialize instead of failing on lock upgrade.
    /// Read-only connections take no write lock.
    fn begin(&self) -> DbResult<Box<dyn Transaction + '_>> {
        let conn = self.lock()?;
        let begin = if self.read_only { "BEGIN" } else { "BEGIN IMMEDIATE" };
        conn.execute_batch(begin).map_err(|e| match DbError::from(e) {
            DbError::Busy(msg) => DbError::Busy(msg),
            other => DbError::TransactionError(format!("BEGIN failed: {other}")),
        })?;
        Ok(Box::new(SqliteTransaction { conn, open: true }))
    }

    fn db_type(&self) -> &'static str {
        "sqlite"
    }
}

/// Transaction holding the SQLite connection lock until it finishes.
struct SqliteTransaction<'a> {
    conn: MutexGuard<'a, Connection>,
    open: bool,
}

impl SqliteTransaction<'_> {
    fn query_strings(&mut self, sql: &str) -> DbResult<Vec<String>> {
        let mut stmt = self.conn.prepare(sql)?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }
}

impl Transaction for SqliteTransaction<'_> {
    fn execute(&mut self, sql: &str, params: &[&str]) -> DbResult<usize> {
        Ok(self.conn.execute(sql, params_from_iter(params.iter()))?)
    }

    fn query_optional_string(&mut self, sql: &str, params: &[&str]) -> DbResult<Option<String>> {
        match self.conn.query_row(sql, params_from_iter(params.iter()), |row| {
            row.get::<_, Option<String>>(0)
        }) {
            Ok(value) => Ok(value),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
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
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
             ORDER BY name",
        )
    }

    fn index_names(&mut self) -> DbResult<Vec<String>> {
        self.query_strings(
            "SELECT name FROM sqlite_master \
             WHERE type = 'index' AND name NOT LIKE 'sqlite_autoindex_%' \
             ORDER BY name",
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

impl Drop for SqliteTransaction<'_> {
    fn drop(&mut self) {
        if self.open {
            let _ = self.conn.execute_batch("ROLLBACK");
        }
    }
}

#[cfg(test)]
#[path = "sqlite_test.rs"]
mod tests;
