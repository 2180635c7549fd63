//! Error types for the storage provider.

use ag_core::SchemaVersion;
use ag_db::DbError;
use thiserror::Error;

/// Storage and migration errors.
///
/// A failure while applying a step reaches the caller wrapped in
/// [`StorageError::Step`], which names the version that was rolled back.
#[derive(Error, Debug)]
pub enum StorageError {
    /// A registered create-table statement failed (S001).
    #[error("[S001] Unable to create table {table}: {source}")]
    TableCreation {
        table: String,
        #[source]
        source: DbError,
    },

    /// An index, data-fix, or callback statement failed (S002).
    #[error("[S002] Statement '{statement}' failed: {source}")]
    StatementExecution {
        statement: String,
        #[source]
        source: DbError,
    },

    /// Writing the schema version record failed (S003).
    #[error("[S003] Unable to record schema version {version}: {source}")]
    Finalization {
        version: SchemaVersion,
        #[source]
        source: DbError,
    },

    /// Reading the schema version record failed (S004).
    #[error("[S004] Unable to read schema version: {0}")]
    VersionRead(#[source] DbError),

    /// The schema version record holds something that is not a version (S005).
    #[error("[S005] Schema version record is corrupt: '{value}'")]
    CorruptVersion { value: String },

    /// The database was migrated by a newer release than this one (S006).
    #[error("[S006] Storage schema version {current} is newer than the latest supported version {latest}")]
    SchemaTooNew {
        current: SchemaVersion,
        latest: SchemaVersion,
    },

    /// The migration registry is not a contiguous ascending sequence (S007).
    #[error("[S007] Invalid migration registry: {0}")]
    InvalidRegistry(String),

    /// Applying a migration step failed; the step was rolled back (S008).
    #[error("[S008] Storage schema upgrade to version {version} failed: {source}")]
    Step {
        version: SchemaVersion,
        #[source]
        source: Box<StorageError>,
    },

    /// Beginning or finishing a transaction failed (S009).
    #[error("[S009] Storage transaction failed: {0}")]
    Transaction(#[source] DbError),

    /// Opening the storage backend failed (S010).
    #[error("[S010] Unable to open storage: {0}")]
    Connection(#[source] DbError),

    /// Listing the tables present in the database failed (S011).
    #[error("[S011] Unable to inspect storage catalog: {0}")]
    Introspection(#[source] DbError),

    /// A provider read or write failed (S012).
    #[error("[S012] Storage query failed: {0}")]
    Query(#[source] DbError),
}

/// Result type alias for [`StorageError`].
pub type StorageResult<T> = Result<T, StorageError>;

impl StorageError {
    /// Whether this failure is the footprint of a concurrent peer applying
    /// the same step first, rather than a real defect.
    pub fn is_benign_duplicate(&self) -> bool {
        match self {
            StorageError::TableCreation { source, .. }
            | StorageError::StatementExecution { source, .. }
            | StorageError::Finalization { source, .. }
            | StorageError::Transaction(source) => source.is_duplicate_object(),
            StorageError::Step { source, .. } => source.is_benign_duplicate(),
            _ => false,
        }
    }

    /// The underlying driver error, if any.
    pub fn db_error(&self) -> Option<&DbError> {
        match self {
            StorageError::TableCreation { source, .. }
            | StorageError::StatementExecution { source, .. }
            | StorageError::Finalization { source, .. } => Some(source),
            StorageError::VersionRead(source)
            | StorageError::Transaction(source)
            | StorageError::Connection(source)
            | StorageError::Introspection(source)
            | StorageError::Query(source) => Some(source),
            StorageError::Step { source, .. } => source.db_error(),
            StorageError::CorruptVersion { .. }
            | StorageError::SchemaTooNew { .. }
            | StorageError::InvalidRegistry(_) => None,
        }
    }
}
