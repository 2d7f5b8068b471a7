use crate::model::metadata::ColumnSpec;
use crate::value::SqlType;

/// Mapping of one entity field to one column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    name: String,
    field_name: &'static str,
    sql_type: SqlType,
    nullable: bool,
    insertable: bool,
    updatable: bool,
    primary_key: bool,
    column_definition: Option<String>,
    populate_on_insert: bool,
}

impl FieldDescriptor {
    /// Field backed by explicit column metadata
    pub(crate) fn from_column(field_name: &'static str, sql_type: SqlType, spec: ColumnSpec) -> Self {
        let name = if spec.name.trim().is_empty() {
            field_name.to_uppercase()
        } else {
            spec.name
        };
        Self {
            name,
            field_name,
            sql_type,
            nullable: spec.nullable,
            insertable: spec.insertable,
            updatable: spec.updatable,
            primary_key: false,
            column_definition: spec
                .column_definition
                .filter(|d| !d.trim().is_empty()),
            populate_on_insert: spec.populate_on_insert,
        }
    }

    /// Key field declared without column metadata
    pub(crate) fn implicit_key(field_name: &'static str, sql_type: SqlType) -> Self {
        Self {
            name: field_name.to_uppercase(),
            field_name,
            sql_type,
            nullable: false,
            insertable: true,
            updatable: false,
            primary_key: false,
            column_definition: None,
            populate_on_insert: false,
        }
    }

    /// Primary keys are never updatable
    pub(crate) fn mark_primary_key(&mut self) {
        self.primary_key = true;
        self.updatable = false;
    }

    /// Column name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_name(&self) -> &'static str {
        self.field_name
    }

    pub fn sql_type(&self) -> &SqlType {
        &self.sql_type
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn is_insertable(&self) -> bool {
        self.insertable
    }

    pub fn is_updatable(&self) -> bool {
        self.updatable
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    pub fn column_definition(&self) -> Option<&str> {
        self.column_definition.as_deref()
    }

    pub fn populates_on_insert(&self) -> bool {
        self.populate_on_insert
    }

    /// Declared enum values in declaration order
    pub fn enum_values(&self) -> Option<&[String]> {
        match &self.sql_type {
            SqlType::Enum(values) => Some(values),
            _ => None,
        }
    }
}
