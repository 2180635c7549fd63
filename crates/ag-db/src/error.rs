//! Error types for ag-db

use thiserror::Error;

/// Database operation errors
#[derive(Error, Debug)]
pub enum DbError {
    /// Connection error (D001)
    #[error("[D001] Database connection failed: {0}")]
    ConnectionError(String),

    /// Query execution error (D002)
    #[error("[D002] SQL execution failed: {0}")]
    ExecutionError(String),

    /// Table not found (D003)
    #[error("[D003] Table or view not found: {0}")]
    TableNotFound(String),

    /// Object already exists (D004)
    #[error("[D004] Database object already exists: {0}")]
    AlreadyExists(String),

    /// Unique or primary key constraint violated (D005)
    #[error("[D005] Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Mutex poisoned (D006)
    #[error("[D006] Database mutex poisoned: {0}")]
    MutexPoisoned(String),

    /// Concurrent transaction conflict (D007)
    #[error("[D007] Transaction conflict: {0}")]
    TransactionConflict(String),

    /// Database locked by another connection past the busy timeout (D008)
    #[error("[D008] Database is busy: {0}")]
    Busy(String),

    /// BEGIN/COMMIT/ROLLBACK failed (D009)
    #[error("[D009] Transaction control failed: {0}")]
    TransactionError(String),
}

/// Result type alias for DbError
pub type DbResult<T> = Result<T, DbError>;

impl DbError {
    /// Whether this error is the footprint of a concurrent peer creating the
    /// same object or row first.
    ///
    /// Covers "already exists" DDL failures, unique/primary key violations,
    /// and optimistic-concurrency conflicts.
    pub fn is_duplicate_object(&self) -> bool {
        matches!(
            self,
            DbError::AlreadyExists(_)
                | DbError::ConstraintViolation(_)
                | DbError::TransactionConflict(_)
        )
    }
}

/// Classify a driver error message into a [`DbError`].
///
/// Neither driver exposes structured variants for every case we care about,
/// so the message is matched with narrow patterns. Order matters: "already
/// exists" must win over the broader "Table with name" catalog match.
pub(crate) fn classify_message(msg: String) -> DbError {
    let lower = msg.to_ascii_lowercase();
    if lower.contains("already exists") {
        DbError::AlreadyExists(msg)
    } else if lower.contains("duplicate key")
        || lower.contains("unique constraint")
        || lower.contains("primary key or unique constraint")
        || lower.contains("constraint error")
    {
        DbError::ConstraintViolation(msg)
    } else if lower.contains("write-write conflict") || lower.contains("transaction conflict") {
        DbError::TransactionConflict(msg)
    } else if lower.contains("database is locked") || lower.contains("database is busy") {
        DbError::Busy(msg)
    } else if lower.contains("no such table")
        || (lower.contains("table with name") && lower.contains("does not exist"))
        || (lower.contains("catalog error") && lower.contains("table") && lower.contains("not found"))
    {
        DbError::TableNotFound(msg)
    } else {
        DbError::ExecutionError(msg)
    }
}

/// Wrap a failed COMMIT.
///
/// Conflicts keep their classification so the caller can recognise a peer
/// that committed first; anything else becomes a transaction-control error.
pub(crate) fn commit_error(err: DbError) -> DbError {
    if err.is_duplicate_object() {
        err
    } else {
        DbError::TransactionError(format!("COMMIT failed: {err}"))
    }
}

impl From<duckdb::Error> for DbError {
    fn from(err: duckdb::Error) -> Self {
        classify_message(err.to_string())
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        if let rusqlite::Error::SqliteFailure(failure, _) = &err {
            match failure.code {
                ErrorCode::ConstraintViolation => {
                    return DbError::ConstraintViolation(err.to_string())
                }
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => {
                    return DbError::Busy(err.to_string())
                }
                _ => {}
            }
        }
        classify_message(err.to_string())
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
