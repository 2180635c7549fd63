//! Versioned migration registry.
//!
//! A [`MigrationRegistry`] maps each schema version to the [`MigrationStep`]
//! that produces it. Steps describe their work as data: tables keyed by
//! logical name, indexes as structured definitions, and named statements.
//! Work that cannot be expressed as a statement list (a backfill, say) is
//! attached as a [`NamedCallback`].

use crate::error::{StorageError, StorageResult};
use ag_core::SchemaVersion;
use ag_db::{DbResult, Transaction};
use std::borrow::Cow;
use std::collections::HashSet;

/// Placeholder substituted with the table name in a table template.
pub const TABLE_PLACEHOLDER: &str = "{table}";

/// Creation statement for one table, keyed by the table's logical name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableStatement {
    /// Table name, also the key checked against the existing table set.
    pub table: &'static str,
    /// SQL template containing [`TABLE_PLACEHOLDER`].
    pub template: &'static str,
}

impl TableStatement {
    /// Render the creation SQL for this table.
    pub fn sql(&self) -> String {
        self.template.replace(TABLE_PLACEHOLDER, self.table)
    }
}

/// Structural index definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    /// Index name
    pub name: &'static str,
    /// Indexed table
    pub table: &'static str,
    /// Indexed columns, in key order
    pub columns: &'static [&'static str],
}

impl IndexDef {
    /// Render as `CREATE INDEX IF NOT EXISTS`.
    ///
    /// Only valid on backends whose capabilities report conditional index
    /// support.
    pub fn create_if_not_exists_sql(&self) -> String {
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
            self.name,
            self.table,
            self.columns.join(", ")
        )
    }

    /// The index as a named statement for the executor.
    pub fn to_statement(&self) -> NamedStatement {
        NamedStatement {
            name: Cow::Owned(format!("create index {}", self.name)),
            sql: Cow::Owned(self.create_if_not_exists_sql()),
        }
    }
}

/// A statement with a logical identity used in error reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedStatement {
    pub name: Cow<'static, str>,
    pub sql: Cow<'static, str>,
}

/// Custom step logic run inside the step's transaction.
pub type StepCallback = fn(&mut dyn Transaction) -> DbResult<()>;

/// A named callback attached to a migration step.
#[derive(Clone)]
pub struct NamedCallback {
    pub name: &'static str,
    pub run: StepCallback,
}

impl std::fmt::Debug for NamedCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedCallback")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// The unit of work that advances the schema to [`version`](Self::version).
#[derive(Debug, Clone)]
pub struct MigrationStep {
    pub version: SchemaVersion,
    pub create_tables: Vec<TableStatement>,
    pub create_indexes: Vec<IndexDef>,
    pub statements: Vec<NamedStatement>,
    pub callbacks: Vec<NamedCallback>,
}

impl MigrationStep {
    /// An empty step for `version`.
    ///
    /// Registered as-is it is a no-op bump: it still advances the persisted
    /// version through the normal finalize path.
    pub fn new(version: u32) -> Self {
        Self {
            version: SchemaVersion::new(version),
            create_tables: Vec::new(),
            create_indexes: Vec::new(),
            statements: Vec::new(),
            callbacks: Vec::new(),
        }
    }

    /// Add a create-if-absent table.
    pub fn table(mut self, table: &'static str, template: &'static str) -> Self {
        self.create_tables.push(TableStatement { table, template });
        self
    }

    /// Add an index, created only where conditional index creation is supported.
    pub fn index(
        mut self,
        name: &'static str,
        table: &'static str,
        columns: &'static [&'static str],
    ) -> Self {
        self.create_indexes.push(IndexDef {
            name,
            table,
            columns,
        });
        self
    }

    /// Add an unconditional statement run after tables and indexes.
    pub fn statement(mut self, name: &'static str, sql: &'static str) -> Self {
        self.statements.push(NamedStatement {
            name: Cow::Borrowed(name),
            sql: Cow::Borrowed(sql),
        });
        self
    }

    /// Attach custom logic run after the step's statements.
    pub fn callback(mut self, name: &'static str, run: StepCallback) -> Self {
        self.callbacks.push(NamedCallback { name, run });
        self
    }

    /// Whether the step makes no structural or data change at all.
    pub fn is_noop(&self) -> bool {
        self.create_tables.is_empty()
            && self.create_indexes.is_empty()
            && self.statements.is_empty()
            && self.callbacks.is_empty()
    }

    /// The index definitions rendered as executor statements.
    pub fn index_statements(&self) -> Vec<NamedStatement> {
        self.create_indexes.iter().map(IndexDef::to_statement).collect()
    }
}

/// Ordered, immutable mapping from schema version to migration step.
#[derive(Debug, Clone)]
pub struct MigrationRegistry {
    steps: Vec<MigrationStep>,
}

impl MigrationRegistry {
    /// Build a registry, checking that versions run 1, 2, 3, ... without gaps
    /// and that no step registers the same table or index twice.
    pub fn new(steps: Vec<MigrationStep>) -> StorageResult<Self> {
        for (idx, step) in steps.iter().enumerate() {
            let expected = idx as u32 + 1;
            if step.version.get() != expected {
                return Err(StorageError::InvalidRegistry(format!(
                    "expected version {expected} at position {idx}, found version {}",
                    step.version
                )));
            }

            let mut tables = HashSet::new();
            for table in &step.create_tables {
                if !tables.insert(table.table) {
                    return Err(StorageError::InvalidRegistry(format!(
                        "version {} registers table '{}' twice",
                        step.version, table.table
                    )));
                }
                if !table.template.contains(TABLE_PLACEHOLDER) {
                    return Err(StorageError::InvalidRegistry(format!(
                        "version {} table '{}' template is missing the {TABLE_PLACEHOLDER} placeholder",
                        step.version, table.table
                    )));
                }
            }

            let mut indexes = HashSet::new();
            for index in &step.create_indexes {
                if !indexes.insert(index.name) {
                    return Err(StorageError::InvalidRegistry(format!(
                        "version {} registers index '{}' twice",
                        step.version, index.name
                    )));
                }
            }
        }
        Ok(Self { steps })
    }

    /// The registry this build of authgate ships with.
    pub fn builtin() -> Self {
        Self {
            steps: crate::ddl::builtin_steps(),
        }
    }

    /// The step that produces `version`, if registered.
    pub fn steps_for(&self, version: SchemaVersion) -> Option<&MigrationStep> {
        let idx = version.get().checked_sub(1)? as usize;
        self.steps.get(idx)
    }

    /// Highest registered version, or 0 for an empty registry.
    pub fn latest_version(&self) -> SchemaVersion {
        self.steps
            .last()
            .map(|step| step.version)
            .unwrap_or(SchemaVersion::ZERO)
    }

    /// Versions that would be applied starting from `current`.
    pub fn pending_after(&self, current: SchemaVersion) -> Vec<SchemaVersion> {
        current.upgrades_to(self.latest_version()).collect()
    }

    /// All registered steps, ascending.
    pub fn steps(&self) -> &[MigrationStep] {
        &self.steps
    }
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;
