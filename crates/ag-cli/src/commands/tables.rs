//! List storage tables and indexes.

use crate::cli::GlobalArgs;
use crate::commands::common::print_table;
use crate::context::RuntimeContext;
use ag_storage::StorageError;
use anyhow::{Context, Result};

/// Execute the tables command.
pub async fn execute(global: &GlobalArgs) -> Result<()> {
    let ctx = RuntimeContext::new(global)?;
    let provider = ctx.open_storage()?;

    let tables = provider
        .table_names()
        .context("Failed to list storage tables")?;

    let rows = provider
        .transaction(|tx| {
            tables
                .iter()
                .map(|table| {
                    let count = tx
                        .query_count(&format!("SELECT * FROM {table}"))
                        .map_err(StorageError::Query)?;
                    Ok(vec![table.clone(), count.to_string()])
                })
                .collect::<Result<Vec<_>, StorageError>>()
        })
        .context("Failed to count table rows")?;

    println!(
        "Storage tables ({}), schema version {}:\n",
        tables.len(),
        provider.schema_version()?
    );
    print_table(&["table", "rows"], &rows);

    let indexes = provider
        .index_names()
        .context("Failed to list storage indexes")?;
    if !indexes.is_empty() {
        println!("\nIndexes: {}", indexes.join(", "));
    }

    Ok(())
}
