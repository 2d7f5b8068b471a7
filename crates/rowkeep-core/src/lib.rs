//! rowkeep core - entity mapping and identity-tracked persistence
//!
//! This crate provides:
//! - Declarative entity metadata and immutable entity descriptors
//! - DDL generation and startup schema deployment/migration
//! - Memoized canonical SQL statements per descriptor
//! - A persistence session with an identity map and dirty checking
//! - The resource and value-conversion seams a store adapter implements
//!
//! The default value converter targets a MySQL-like dialect.

pub mod ddl;
pub mod errors;
pub mod logging_facility;
pub mod model;
pub mod registry;
pub mod resource;
pub mod session;
pub mod templates;
pub mod value;

// Used by the logging macros
pub use rowkeep_core_types;

// Re-export commonly used types
pub use ddl::{DeployAction, DeployOutcome, DeployReport};
pub use errors::{MappingError, Result, RkError, RkErrorKind};
pub use model::{
    ColumnSpec, DeployFlags, Entity, EntityDescriptor, EntityMetadata, EntitySchema,
    FieldDescriptor, FieldMeta, IndexMeta, TableMeta,
};
pub use resource::{
    Connection, ConnectionFactory, KeyRetrieval, LiveColumn, Row, Statement, Transaction,
};
pub use session::{Managed, Persisted, Session};
pub use value::{MySqlConverter, SqlType, Value, ValueConverter};
