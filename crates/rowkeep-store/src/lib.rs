//! rowkeep Store - SQLite resource adapter and store configuration
//!
//! Provides:
//! - `SqliteConnectionFactory`, the resource seams over rusqlite
//! - `SqliteConverter`, value conversion for SQLite type affinities
//! - YAML store configuration with per-table deploy overrides

pub mod config;
pub mod db;
pub mod errors;
pub mod sqlite;

// Re-export key types
pub use config::StoreConfig;
pub use errors::Result;
pub use sqlite::{SqliteConnection, SqliteConnectionFactory, SqliteConverter};
