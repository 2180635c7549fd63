//! Database and transaction trait definitions

use crate::error::DbResult;

/// An open transaction against a storage backend.
///
/// Every statement runs inside the transaction until [`commit`](Self::commit)
/// or [`rollback`](Self::rollback) consumes it. Implementations roll back when
/// dropped without being finished, so an early `?` return never leaves a
/// half-applied transaction behind.
pub trait Transaction {
    /// Execute a statement with positional string parameters, returns affected rows
    fn execute(&mut self, sql: &str, params: &[&str]) -> DbResult<usize>;

    /// Query the first column of the first row as a string.
    ///
    /// Returns `None` when the query yields no rows or a NULL value.
    fn query_optional_string(&mut self, sql: &str, params: &[&str]) -> DbResult<Option<String>>;

    /// Execute query returning row count
    fn query_count(&mut self, sql: &str) -> DbResult<usize>;

    /// Names of the base tables currently visible to this transaction, sorted
    fn table_names(&mut self) -> DbResult<Vec<String>>;

    /// Names of the user-defined indexes currently visible to this transaction, sorted
    fn index_names(&mut self) -> DbResult<Vec<String>>;

    /// Commit the transaction
    fn commit(self: Box<Self>) -> DbResult<()>;

    /// Roll back the transaction
    fn rollback(self: Box<Self>) -> DbResult<()>;
}

/// Database abstraction trait for authgate storage
///
/// Implementations must be Send + Sync so a single connection can be shared
/// by the services that sit on top of the storage provider.
pub trait Database: Send + Sync {
    /// Begin a transaction.
    ///
    /// The transaction holds the connection exclusively until it finishes.
    fn begin(&self) -> DbResult<Box<dyn Transaction + '_>>;

    /// Backend identity, used for logging and capability lookup
    fn db_type(&self) -> &'static str;

    /// List base tables in a short-lived read transaction
    fn table_names(&self) -> DbResult<Vec<String>> {
        let mut tx = self.begin()?;
        let names = tx.table_names()?;
        tx.rollback()?;
        Ok(names)
    }

    /// List indexes in a short-lived read transaction
    fn index_names(&self) -> DbResult<Vec<String>> {
        let mut tx = self.begin()?;
        let names = tx.index_names()?;
        tx.rollback()?;
        Ok(names)
    }
}
