//! Error handling for rowkeep-store
//!
//! Wraps rowkeep-core RkError with store-specific helpers

use rowkeep_core::errors::{storage_error, RkError, RkErrorKind};

/// Result type alias using RkError
pub type Result<T> = std::result::Result<T, RkError>;

/// Create a storage error from rusqlite::Error, keeping the statement text
pub fn from_rusqlite(op: &str, sql: &str, err: rusqlite::Error) -> RkError {
    storage_error(op, sql, err)
}

/// Create a storage error for a connection that could not be opened
pub fn open_error(path: &str, err: rusqlite::Error) -> RkError {
    RkError::new(RkErrorKind::Storage)
        .with_op("open")
        .with_message(format!("Cannot open database {}: {}", path, err))
}

/// Create a configuration error
pub fn config_error(reason: impl std::fmt::Display) -> RkError {
    RkError::new(RkErrorKind::Configuration)
        .with_op("load_config")
        .with_message(reason.to_string())
}

/// Create an IO error while reading configuration
pub fn io_error(path: &str, err: std::io::Error) -> RkError {
    config_error(format!("Cannot read {}: {}", path, err))
}
