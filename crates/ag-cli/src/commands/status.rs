//! Report the storage schema version without migrating.
//!
//! The database is opened read-only, so a mistyped path fails instead of
//! leaving an empty database behind.

use crate::cli::{GlobalArgs, StatusArgs};
use crate::commands::common::format_versions;
use crate::context::RuntimeContext;
use ag_core::SchemaVersion;
use ag_db::{connect_read_only, Capabilities};
use ag_storage::migration::current_version;
use ag_storage::MigrationRegistry;
use anyhow::{Context, Result};
use serde::Serialize;

/// Machine-readable status output.
#[derive(Debug, Serialize)]
struct StatusReport {
    name: String,
    backend: &'static str,
    path: String,
    current_version: SchemaVersion,
    latest_version: SchemaVersion,
    pending: Vec<SchemaVersion>,
    conditional_index: bool,
    transactional_ddl: bool,
}

/// Execute the status command.
pub async fn execute(args: &StatusArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = RuntimeContext::new(global)?;
    let db = connect_read_only(&ctx.storage).with_context(|| {
        format!(
            "Failed to open {} storage at {}",
            ctx.storage.db_type, ctx.storage.path
        )
    })?;

    let registry = MigrationRegistry::builtin();
    let current = current_version(db.as_ref()).context("Failed to read schema version")?;
    let capabilities = Capabilities::for_backend(db.db_type());

    let report = StatusReport {
        name: ctx.config.name.clone(),
        backend: db.db_type(),
        path: ctx.storage.path.clone(),
        current_version: current,
        latest_version: registry.latest_version(),
        pending: registry.pending_after(current),
        conditional_index: capabilities.conditional_index,
        transactional_ddl: capabilities.transactional_ddl,
    };

    if args.json {
        let output =
            serde_json::to_string_pretty(&report).context("Failed to serialize JSON output")?;
        println!("{output}");
        return Ok(());
    }

    println!("{} ({} at {})", report.name, report.backend, report.path);
    println!("  current version: {}", report.current_version);
    println!("  latest version:  {}", report.latest_version);
    println!("  pending:         {}", format_versions(&report.pending));
    if report.current_version > report.latest_version {
        println!("  schema was written by a newer release; this one will refuse to start");
    }

    Ok(())
}
