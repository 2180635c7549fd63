//! Bring the storage schema up to date.

use crate::cli::GlobalArgs;
use crate::commands::common::format_versions;
use crate::context::RuntimeContext;
use anyhow::Result;

/// Execute the migrate command.
///
/// Opening the provider runs the upgrade; any failure aborts with a non-zero
/// exit and leaves the persisted version at the last committed step.
pub async fn execute(global: &GlobalArgs) -> Result<()> {
    let ctx = RuntimeContext::new(global)?;
    let provider = ctx.open_storage()?;
    let report = provider.startup_report();

    if report.is_noop() {
        println!(
            "Storage schema is up to date at version {} ({})",
            report.to, report.backend
        );
        return Ok(());
    }

    println!(
        "Storage schema upgraded from version {} to {} ({})",
        report.from, report.to, report.backend
    );
    println!("  applied:  {}", format_versions(&report.applied));
    if !report.adopted.is_empty() {
        println!(
            "  adopted:  {} (committed by another instance)",
            format_versions(&report.adopted)
        );
    }
    for (version, index) in &report.skipped_indexes {
        println!(
            "  skipped index {index} at version {version}: not supported by {}",
            report.backend
        );
    }

    Ok(())
}
