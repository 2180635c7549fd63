//! Storage provider for authgate.
//!
//! Owns the schema definition of the gateway's durable store and the engine
//! that brings any database, whatever state it was left in, up to that
//! definition before the rest of the service touches it.
//!
//! - [`registry`]: Versioned migration steps
//! - [`executor`]: Idempotent table creation and ordered statement runs
//! - [`version`]: Persisted version record (read and finalize)
//! - [`migration`]: The upgrade orchestrator
//! - [`provider`]: The facade services open at startup

pub mod ddl;
pub mod error;
pub mod executor;
pub mod migration;
pub mod provider;
pub mod registry;
pub mod version;

pub use error::{StorageError, StorageResult};
pub use migration::{upgrade, UpgradeReport};
pub use provider::StorageProvider;
pub use registry::{IndexDef, MigrationRegistry, MigrationStep, NamedCallback, NamedStatement};
