//! ag-core - Core library for authgate
//!
//! This crate provides the shared types used across all authgate components:
//! gateway configuration parsing, the storage section consumed by the
//! database layer, and the [`SchemaVersion`] marker the migration engine
//! persists.

pub mod config;
pub mod error;
pub mod schema_version;

pub use config::{Config, DbType, StorageConfig};
pub use error::{CoreError, CoreResult};
pub use schema_version::SchemaVersion;
