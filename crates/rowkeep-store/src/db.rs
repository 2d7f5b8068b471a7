//! Database connection management
//!
//! Provides utilities for opening and configuring SQLite connections

use crate::config::StoreConfig;
use crate::errors::{from_rusqlite, open_error, Result};
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

/// Open a SQLite database at the given path
pub fn open<P: AsRef<Path>>(path: P) -> Result<Connection> {
    let path = path.as_ref();
    Connection::open(path).map_err(|e| open_error(&path.display().to_string(), e))
}

/// Open an in-memory SQLite database (for testing)
pub fn open_in_memory() -> Result<Connection> {
    Connection::open_in_memory().map_err(|e| open_error(":memory:", e))
}

/// Apply the connection pragmas named by `config`
pub fn configure(conn: &Connection, config: &StoreConfig) -> Result<()> {
    let foreign_keys = if config.foreign_keys { "ON" } else { "OFF" };
    let sql = format!("PRAGMA foreign_keys = {}", foreign_keys);
    conn.execute_batch(&sql)
        .map_err(|e| from_rusqlite("configure", &sql, e))?;

    if let Some(mode) = &config.journal_mode {
        // journal_mode reports the resulting mode as a row
        let sql = format!("PRAGMA journal_mode = {}", mode);
        conn.query_row(&sql, [], |row| row.get::<_, String>(0))
            .map_err(|e| from_rusqlite("configure", &sql, e))?;
    }

    if let Some(ms) = config.busy_timeout_ms {
        conn.busy_timeout(Duration::from_millis(ms))
            .map_err(|e| from_rusqlite("configure", "busy_timeout", e))?;
    }

    Ok(())
}
