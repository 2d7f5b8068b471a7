use thiserror::Error;

/// Result type alias using RkError
pub type Result<T> = std::result::Result<T, RkError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Every failure surfaced by rowkeep is classified by one of these kinds.
/// Each kind maps to a stable error code usable for programmatic handling
/// and test assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RkErrorKind {
    /// Bad or missing descriptor input, missing constructor, unknown field name
    Configuration,
    /// DDL/migration statement failure, enum-reflection failure
    Schema,
    /// Operation on an entity type that was never registered
    NotEntity,
    /// Operation requiring a tracked entity on an untracked one
    NotTracked,
    /// Operation requiring exactly one primary-key field saw zero or several
    Cardinality,
    /// Attempted update of a primary key or a non-updatable field
    ConstraintViolation,
    /// Zero affected rows, or generated key requested but not returned
    InsertFailed,
    /// A value could not be converted between its stored and in-memory form
    Conversion,
    /// Any underlying resource/statement failure not covered above
    Storage,
}

impl RkErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            RkErrorKind::Configuration => "ERR_CONFIGURATION",
            RkErrorKind::Schema => "ERR_SCHEMA",
            RkErrorKind::NotEntity => "ERR_NOT_ENTITY",
            RkErrorKind::NotTracked => "ERR_NOT_TRACKED",
            RkErrorKind::Cardinality => "ERR_CARDINALITY",
            RkErrorKind::ConstraintViolation => "ERR_CONSTRAINT_VIOLATION",
            RkErrorKind::InsertFailed => "ERR_INSERT_FAILED",
            RkErrorKind::Conversion => "ERR_CONVERSION",
            RkErrorKind::Storage => "ERR_STORAGE",
        }
    }
}

/// Canonical structured error type
///
/// Carries the classification plus enough context (operation, entity type,
/// table, SQL text) to diagnose a failure without re-running it.
#[derive(Debug, Clone)]
pub struct RkError {
    kind: RkErrorKind,
    op: Option<String>,
    entity_type: Option<String>,
    table: Option<String>,
    sql: Option<String>,
    message: String,
    source: Option<Box<RkError>>,
}

impl RkError {
    /// Create a new error with the specified kind
    pub fn new(kind: RkErrorKind) -> Self {
        Self {
            kind,
            op: None,
            entity_type: None,
            table: None,
            sql: None,
            message: String::new(),
            source: None,
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add entity type context
    pub fn with_entity_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self
    }

    /// Add table context
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Add SQL statement context
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add source error
    pub fn with_source(mut self, source: RkError) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Fill operation and entity type context where the error does not carry it yet.
    ///
    /// Used at public boundaries so lower layers can stay context-free.
    pub fn in_context(mut self, op: &str, entity_type: &str) -> Self {
        if self.op.is_none() {
            self.op = Some(op.to_string());
        }
        if self.entity_type.is_none() {
            self.entity_type = Some(entity_type.to_string());
        }
        self
    }

    /// Re-classify a lower-level error, keeping it as the source
    pub fn wrap(kind: RkErrorKind, source: RkError) -> Self {
        let mut err = RkError::new(kind).with_message(source.message.clone());
        err.op = source.op.clone();
        err.entity_type = source.entity_type.clone();
        err.table = source.table.clone();
        err.sql = source.sql.clone();
        err.with_source(source)
    }

    /// Get the error kind
    pub fn kind(&self) -> RkErrorKind {
        self.kind
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Get the operation context, if any
    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    /// Get the entity type context, if any
    pub fn entity_type(&self) -> Option<&str> {
        self.entity_type.as_deref()
    }

    /// Get the table context, if any
    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    /// Get the SQL context, if any
    pub fn sql(&self) -> Option<&str> {
        self.sql.as_deref()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the source error, if any
    pub fn source_error(&self) -> Option<&RkError> {
        self.source.as_deref()
    }
}

impl std::fmt::Display for RkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(entity_type) = &self.entity_type {
            write!(f, " (entity_type: {})", entity_type)?;
        }
        if let Some(table) = &self.table {
            write!(f, " (table: {})", table)?;
        }
        if let Some(sql) = &self.sql {
            write!(f, " (sql: {})", sql)?;
        }
        Ok(())
    }
}

impl std::error::Error for RkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|s| s as &(dyn std::error::Error + 'static))
    }
}

// ========== End Error Facility ==========

/// Detailed failure cases raised by the mapping layer
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MappingError {
    // ===== Descriptor Errors =====
    /// Entity metadata carries no table (or an empty table name)
    #[error("No table metadata for entity {entity_type}")]
    MissingTable { entity_type: String },

    /// Entity metadata carries no no-argument constructor
    #[error("No constructor registered for entity {entity_type}")]
    MissingConstructor { entity_type: String },

    /// Field name not known to the descriptor
    #[error("No such field {field} in table {table}")]
    UnknownField { table: String, field: String },

    // ===== Registration Errors =====
    /// Entity type was never registered with the session
    #[error("Not an entity type, no descriptor registered: {entity_type}")]
    NotEntity { entity_type: String },

    /// Entity is not tracked by the session
    #[error("Entity of type {entity_type} is not managed by this session")]
    NotTracked { entity_type: String },

    // ===== Key Errors =====
    /// Operation requires exactly one primary-key field
    #[error("Table {table} must have exactly 1 primary key field, found {found}")]
    PrimaryKeyCardinality { table: String, found: usize },

    /// Dirty-check found a changed primary key
    #[error("Update primary key {field} of table {table}")]
    UpdatePrimaryKey { table: String, field: String },

    /// Dirty-check found a changed non-updatable field
    #[error("Field {field} of table {table} is not updatable")]
    FieldNotUpdatable { table: String, field: String },

    // ===== Insert Errors =====
    /// Insert statement reported zero affected rows
    #[error("Insert into {table} failed, no affected rows")]
    NoAffectedRows { table: String },

    /// Generated key was requested but not returned
    #[error("Insert into {table} failed, no generated key obtained")]
    NoGeneratedKey { table: String },

    // ===== Storage Errors =====
    /// Row of a tracked entity vanished from the store
    #[error("Row of table {table} disappeared during refresh")]
    RowVanished { table: String },

    /// Value type does not match the expected field type
    #[error("Cannot convert {found} into {expected}")]
    TypeMismatch { expected: String, found: String },

    /// Live enum column definition could not be parsed
    #[error("Cannot read enum definition of column {column}: {definition}")]
    EnumReflection { column: String, definition: String },
}

/// Conversion from MappingError to RkError
impl From<MappingError> for RkError {
    fn from(err: MappingError) -> Self {
        let message = err.to_string();
        match err {
            MappingError::MissingTable { entity_type }
            | MappingError::MissingConstructor { entity_type } => {
                RkError::new(RkErrorKind::Configuration)
                    .with_entity_type(entity_type)
                    .with_message(message)
            }
            MappingError::UnknownField { table, .. } => RkError::new(RkErrorKind::Configuration)
                .with_table(table)
                .with_message(message),
            MappingError::NotEntity { entity_type } => RkError::new(RkErrorKind::NotEntity)
                .with_entity_type(entity_type)
                .with_message(message),
            MappingError::NotTracked { entity_type } => RkError::new(RkErrorKind::NotTracked)
                .with_entity_type(entity_type)
                .with_message(message),
            MappingError::PrimaryKeyCardinality { table, .. } => {
                RkError::new(RkErrorKind::Cardinality)
                    .with_table(table)
                    .with_message(message)
            }
            MappingError::UpdatePrimaryKey { table, .. }
            | MappingError::FieldNotUpdatable { table, .. } => {
                RkError::new(RkErrorKind::ConstraintViolation)
                    .with_table(table)
                    .with_message(message)
            }
            MappingError::NoAffectedRows { table } | MappingError::NoGeneratedKey { table } => {
                RkError::new(RkErrorKind::InsertFailed)
                    .with_table(table)
                    .with_message(message)
            }
            MappingError::RowVanished { table } => RkError::new(RkErrorKind::Storage)
                .with_table(table)
                .with_message(message),
            MappingError::TypeMismatch { .. } => {
                RkError::new(RkErrorKind::Conversion).with_message(message)
            }
            MappingError::EnumReflection { .. } => {
                RkError::new(RkErrorKind::Schema).with_message(message)
            }
        }
    }
}

/// Create a storage error for a failed statement
pub fn storage_error(op: &str, sql: &str, reason: impl std::fmt::Display) -> RkError {
    RkError::new(RkErrorKind::Storage)
        .with_op(op)
        .with_sql(sql)
        .with_message(reason.to_string())
}

/// Create a schema error for a failed DDL/migration statement
pub fn schema_error(table: &str, sql: &str, source: RkError) -> RkError {
    RkError::new(RkErrorKind::Schema)
        .with_op("deploy")
        .with_table(table)
        .with_sql(sql)
        .with_message(format!("Deploy of table {} failed: {}", table, source.message()))
        .with_source(source)
}
