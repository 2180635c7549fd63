//! Schema upgrade orchestrator.
//!
//! Brings a database from its persisted version up to the registry's latest
//! version, one step per transaction. A step either commits together with its
//! version record or rolls back entirely, and the first failed step halts the
//! run: later steps may rely on the structure earlier ones create.

use crate::error::{StorageError, StorageResult};
use crate::executor::{create_tables_if_absent, run_callbacks, run_statements};
use crate::registry::{MigrationRegistry, MigrationStep};
use crate::version::{ensure_config_table, finalize, read_version, CONFIG_TABLE};
use ag_core::SchemaVersion;
use ag_db::{Capabilities, Database, Transaction};

/// Outcome of an [`upgrade`] run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeReport {
    /// Backend identity the run executed against
    pub backend: &'static str,
    /// Persisted version before the run
    pub from: SchemaVersion,
    /// Persisted version after the run
    pub to: SchemaVersion,
    /// Versions this process committed, ascending
    pub applied: Vec<SchemaVersion>,
    /// Versions a concurrent process committed first
    pub adopted: Vec<SchemaVersion>,
    /// Indexes left out because the backend cannot create them conditionally
    pub skipped_indexes: Vec<(SchemaVersion, String)>,
}

impl UpgradeReport {
    fn new(backend: &'static str, from: SchemaVersion) -> Self {
        Self {
            backend,
            from,
            to: from,
            applied: Vec::new(),
            adopted: Vec::new(),
            skipped_indexes: Vec::new(),
        }
    }

    /// Whether the database was already up to date.
    pub fn is_noop(&self) -> bool {
        self.from == self.to
    }
}

/// Read the persisted schema version in a short read transaction.
pub fn current_version(db: &dyn Database) -> StorageResult<SchemaVersion> {
    let mut tx = db.begin().map_err(StorageError::Transaction)?;
    let tables = tx.table_names().map_err(StorageError::Introspection)?;
    let version = read_version(tx.as_mut(), &tables)?;
    tx.rollback().map_err(StorageError::Transaction)?;
    Ok(version)
}

/// Apply every registered step above the persisted version.
///
/// Fails with [`StorageError::SchemaTooNew`] when the database records a
/// version this registry does not know. Any step failure is returned as
/// [`StorageError::Step`] naming the version that was rolled back.
///
/// A step that fails only because a concurrent process already applied it
/// is not an error: once the persisted version shows the peer's commit, the
/// run continues from there.
pub fn upgrade(db: &dyn Database, registry: &MigrationRegistry) -> StorageResult<UpgradeReport> {
    let backend = db.db_type();
    let capabilities = Capabilities::for_backend(backend);
    let latest = registry.latest_version();

    let from = current_version(db)?;
    let mut report = UpgradeReport::new(backend, from);

    if from > latest {
        return Err(StorageError::SchemaTooNew {
            current: from,
            latest,
        });
    }
    if from == latest {
        log::debug!("storage schema is up to date at version {from}");
        return Ok(report);
    }

    log::info!("upgrading {backend} storage schema from version {from} to {latest}");
    if !capabilities.transactional_ddl {
        log::warn!(
            "{backend} commits DDL implicitly, a failed step may leave its tables behind"
        );
    }

    let mut current = from;
    while let Some(target) = current.next().filter(|v| *v <= latest) {
        let step = registry.steps_for(target).ok_or_else(|| {
            StorageError::InvalidRegistry(format!("no step registered for version {target}"))
        })?;

        let result = if current == from {
            bootstrap(db).and_then(|()| apply_step(db, step, capabilities))
        } else {
            apply_step(db, step, capabilities)
        };

        match result {
            Ok(StepOutcome::Applied(skipped)) => {
                report
                    .skipped_indexes
                    .extend(skipped.into_iter().map(|name| (target, name)));
                report.applied.push(target);
                current = target;
            }
            Ok(StepOutcome::AlreadyAt(persisted)) => {
                current = adopt(&mut report, current, persisted, target, latest)?;
            }
            Err(err) if err.is_benign_duplicate() => {
                let persisted = current_version(db).map_err(|e| step_failed(target, e))?;
                if persisted < target {
                    return Err(step_failed(target, err));
                }
                current = adopt(&mut report, current, persisted, target, latest)?;
            }
            Err(err) => return Err(step_failed(target, err)),
        }
    }

    report.to = current;
    log::info!("storage schema is at version {current}");
    Ok(report)
}

/// Continue from a version a concurrent process committed.
fn adopt(
    report: &mut UpgradeReport,
    current: SchemaVersion,
    persisted: SchemaVersion,
    target: SchemaVersion,
    latest: SchemaVersion,
) -> StorageResult<SchemaVersion> {
    if persisted > latest {
        return Err(StorageError::SchemaTooNew {
            current: persisted,
            latest,
        });
    }
    log::info!(
        "storage schema version {target} was applied concurrently, continuing from version {persisted}"
    );
    report.adopted.extend(current.upgrades_to(persisted));
    Ok(persisted)
}

fn step_failed(version: SchemaVersion, source: StorageError) -> StorageError {
    StorageError::Step {
        version,
        source: Box::new(source),
    }
}

/// Create the `config` table holding the version record.
fn bootstrap(db: &dyn Database) -> StorageResult<()> {
    let mut tx = db.begin().map_err(StorageError::Transaction)?;
    match ensure_config_table(tx.as_mut()).and_then(|()| tx.commit()) {
        Ok(()) => Ok(()),
        // A peer created it between our check and our commit.
        Err(source) if source.is_duplicate_object() => {
            log::debug!("{CONFIG_TABLE} table created concurrently");
            Ok(())
        }
        Err(source) => Err(StorageError::TableCreation {
            table: CONFIG_TABLE.to_string(),
            source,
        }),
    }
}

/// What a step transaction found or did.
enum StepOutcome {
    /// Committed, with the names of skipped indexes
    Applied(Vec<String>),
    /// The persisted version already covered the step; nothing was written
    AlreadyAt(SchemaVersion),
}

/// Run one step in its own transaction.
fn apply_step(
    db: &dyn Database,
    step: &MigrationStep,
    capabilities: Capabilities,
) -> StorageResult<StepOutcome> {
    let mut tx = db.begin().map_err(StorageError::Transaction)?;

    match apply_step_in(tx.as_mut(), step, capabilities) {
        Ok(StepOutcome::Applied(skipped)) => {
            tx.commit().map_err(StorageError::Transaction)?;
            Ok(StepOutcome::Applied(skipped))
        }
        Ok(StepOutcome::AlreadyAt(persisted)) => {
            tx.rollback().map_err(StorageError::Transaction)?;
            Ok(StepOutcome::AlreadyAt(persisted))
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback() {
                log::warn!(
                    "rollback of storage schema version {} failed: {rollback_err}",
                    step.version
                );
            }
            Err(err)
        }
    }
}

fn apply_step_in(
    tx: &mut dyn Transaction,
    step: &MigrationStep,
    capabilities: Capabilities,
) -> StorageResult<StepOutcome> {
    let tables = tx.table_names().map_err(StorageError::Introspection)?;

    // The version read before the run may predate a peer's commit.
    let persisted = read_version(tx, &tables)?;
    if persisted >= step.version {
        return Ok(StepOutcome::AlreadyAt(persisted));
    }

    create_tables_if_absent(tx, &step.create_tables, &tables)?;

    let mut skipped = Vec::new();
    if capabilities.conditional_index {
        run_statements(tx, &step.index_statements())?;
    } else {
        for index in &step.create_indexes {
            log::info!(
                "skipping index {} on {}: backend cannot create indexes conditionally",
                index.name,
                index.table
            );
            skipped.push(index.name.to_string());
        }
    }

    run_statements(tx, &step.statements)?;
    run_callbacks(tx, &step.callbacks)?;

    if step.is_noop() {
        log::trace!("tables are {tables:?}");
    }

    finalize(tx, step.version)?;
    Ok(StepOutcome::Applied(skipped))
}

#[cfg(test)]
#[path = "migration_test.rs"]
mod tests;
