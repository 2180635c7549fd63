//! ag-db - Database abstraction layer for authgate
//!
//! This crate provides the `Database` and `Transaction` traits the storage
//! engine migrates through, the per-backend capability descriptor, and
//! implementations for SQLite and DuckDB.

pub mod capabilities;
pub mod connect;
pub mod duckdb;
pub mod error;
pub mod sqlite;
pub mod traits;

pub use capabilities::Capabilities;
pub use connect::{connect, connect_read_only};
pub use crate::duckdb::DuckDbBackend;
pub use error::{DbError, DbResult};
pub use sqlite::SqliteBackend;
pub use traits::{Database, Transaction};
