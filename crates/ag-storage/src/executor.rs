//! Statement executor.
//!
//! Both operations run inside a transaction owned by the caller and perform
//! no compensating action on failure: atomicity comes from the caller
//! rolling that transaction back.

use crate::error::{StorageError, StorageResult};
use crate::registry::{NamedCallback, NamedStatement, TableStatement};
use ag_db::Transaction;

/// Create every table in `statements` that is not already in `existing_tables`.
///
/// Tables are created in registration order. A partially applied earlier run
/// is therefore harmless: whatever it managed to create is skipped.
pub fn create_tables_if_absent(
    tx: &mut dyn Transaction,
    statements: &[TableStatement],
    existing_tables: &[String],
) -> StorageResult<()> {
    for statement in statements {
        if existing_tables.iter().any(|t| t == statement.table) {
            log::trace!("table {} already exists, skipping", statement.table);
            continue;
        }

        tx.execute(&statement.sql(), &[])
            .map_err(|source| StorageError::TableCreation {
                table: statement.table.to_string(),
                source,
            })?;
        log::trace!("created table {}", statement.table);
    }

    Ok(())
}

/// Execute `statements` in order, stopping at the first failure.
pub fn run_statements(tx: &mut dyn Transaction, statements: &[NamedStatement]) -> StorageResult<()> {
    for statement in statements {
        tx.execute(&statement.sql, &[])
            .map_err(|source| StorageError::StatementExecution {
                statement: statement.name.to_string(),
                source,
            })?;
    }

    Ok(())
}

/// Run step callbacks in order, stopping at the first failure.
pub fn run_callbacks(tx: &mut dyn Transaction, callbacks: &[NamedCallback]) -> StorageResult<()> {
    for callback in callbacks {
        (callback.run)(tx).map_err(|source| StorageError::StatementExecution {
            statement: callback.name.to_string(),
            source,
        })?;
    }

    Ok(())
}

#[cfg(test)]
#[path = "executor_test.rs"]
mod tests;
