//! Declarative entity metadata
//!
//! This is the input side of the descriptor builder. Entity types describe
//! their table, columns, keys and field accessors explicitly; no runtime
//! introspection is involved. `TableMeta` and `DeployFlags` deserialize with
//! serde so a declarative front end (YAML) can supply them.

use crate::errors::Result;
use crate::value::{SqlType, Value};
use serde::Deserialize;

/// Reads one field of an entity as a value
pub type Getter<T> = fn(&T) -> Value;

/// Writes a value into one field of an entity
pub type Setter<T> = fn(&mut T, Value) -> Result<()>;

/// Startup deployment behaviour of a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DeployFlags {
    /// Deploy the table at all
    pub deploy: bool,
    /// Create the table when absent
    pub create: bool,
    /// Drop an existing table (then create it if `create`)
    pub drop: bool,
    /// Truncate an existing table
    pub truncate: bool,
    /// Reconcile columns of an existing table
    pub migrate: bool,
}

impl Default for DeployFlags {
    fn default() -> Self {
        Self {
            deploy: true,
            create: true,
            drop: false,
            truncate: false,
            migrate: false,
        }
    }
}

impl DeployFlags {
    /// Flags that leave the table untouched
    pub fn disabled() -> Self {
        Self {
            deploy: false,
            ..Self::default()
        }
    }

    pub fn with_drop(mut self, drop: bool) -> Self {
        self.drop = drop;
        self
    }

    pub fn with_truncate(mut self, truncate: bool) -> Self {
        self.truncate = truncate;
        self
    }

    pub fn with_migrate(mut self, migrate: bool) -> Self {
        self.migrate = migrate;
        self
    }

    pub fn with_create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }
}

/// Declared index
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct IndexMeta {
    /// Blank names are derived from the table name
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub unique: bool,
    pub columns: Vec<String>,
}

impl IndexMeta {
    /// Index over a comma separated column list, e.g. `"NAME, AGE"`
    pub fn new(name: impl Into<String>, unique: bool, column_list: &str) -> Self {
        Self {
            name: name.into(),
            unique,
            columns: column_list
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

/// Declared table
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TableMeta {
    pub name: String,
    #[serde(default)]
    pub indexes: Vec<IndexMeta>,
    #[serde(default)]
    pub deploy: DeployFlags,
    /// Appended after the closing parenthesis of CREATE TABLE (engine, charset, comment)
    #[serde(default)]
    pub creation_suffix: String,
}

impl TableMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            indexes: Vec::new(),
            deploy: DeployFlags::default(),
            creation_suffix: String::new(),
        }
    }

    pub fn index(mut self, index: IndexMeta) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn deploy(mut self, flags: DeployFlags) -> Self {
        self.deploy = flags;
        self
    }

    pub fn creation_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.creation_suffix = suffix.into();
        self
    }
}

/// Column metadata of a field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    /// Blank names default to the uppercased field name
    pub name: String,
    pub nullable: bool,
    pub insertable: bool,
    pub updatable: bool,
    /// Explicit column type, emitted verbatim in DDL
    pub column_definition: Option<String>,
    /// Receives the store-generated key after insert
    pub populate_on_insert: bool,
}

impl Default for ColumnSpec {
    fn default() -> Self {
        Self {
            name: String::new(),
            nullable: true,
            insertable: true,
            updatable: true,
            column_definition: None,
            populate_on_insert: false,
        }
    }
}

impl ColumnSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn insertable(mut self, insertable: bool) -> Self {
        self.insertable = insertable;
        self
    }

    pub fn updatable(mut self, updatable: bool) -> Self {
        self.updatable = updatable;
        self
    }

    pub fn definition(mut self, definition: impl Into<String>) -> Self {
        self.column_definition = Some(definition.into());
        self
    }

    pub fn populate_on_insert(mut self) -> Self {
        self.populate_on_insert = true;
        self
    }
}

/// One declared field of an entity type
pub struct FieldMeta<T> {
    pub(crate) field_name: &'static str,
    pub(crate) sql_type: SqlType,
    pub(crate) column: Option<ColumnSpec>,
    pub(crate) id: bool,
    pub(crate) get: Getter<T>,
    pub(crate) set: Setter<T>,
}

impl<T> FieldMeta<T> {
    /// A field with accessors but no column or key marker yet
    pub fn new(field_name: &'static str, sql_type: SqlType, get: Getter<T>, set: Setter<T>) -> Self {
        Self {
            field_name,
            sql_type,
            column: None,
            id: false,
            get,
            set,
        }
    }

    pub fn column(mut self, spec: ColumnSpec) -> Self {
        self.column = Some(spec);
        self
    }

    /// Mark the field as (part of) the primary key
    pub fn id(mut self) -> Self {
        self.id = true;
        self
    }
}

/// Everything the descriptor builder needs to know about an entity type
pub struct EntityMetadata<T> {
    pub(crate) type_name: &'static str,
    pub(crate) table: Option<TableMeta>,
    pub(crate) fields: Vec<FieldMeta<T>>,
    pub(crate) constructor: Option<fn() -> T>,
}

impl<T> EntityMetadata<T> {
    pub fn new() -> Self {
        Self {
            type_name: short_type_name::<T>(),
            table: None,
            fields: Vec::new(),
            constructor: None,
        }
    }

    pub fn table(mut self, table: TableMeta) -> Self {
        self.table = Some(table);
        self
    }

    /// Fields are kept in call order, which becomes column order
    pub fn field(mut self, field: FieldMeta<T>) -> Self {
        self.fields.push(field);
        self
    }

    pub fn constructor(mut self, constructor: fn() -> T) -> Self {
        self.constructor = Some(constructor);
        self
    }
}

impl<T: Default> EntityMetadata<T> {
    /// Use `T::default` as the no-argument constructor
    pub fn with_default_constructor(self) -> Self {
        self.constructor(T::default)
    }
}

impl<T> Default for EntityMetadata<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Entity types provide their own metadata
pub trait Entity: Sized + 'static {
    fn metadata() -> EntityMetadata<Self>;
}

/// Last path segment of a type name, e.g. `User` for `app::model::User`
pub(crate) fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_meta_splits_column_list() {
        let index = IndexMeta::new("", true, "NAME, AGE ,");
        assert_eq!(index.columns, vec!["NAME".to_string(), "AGE".to_string()]);
    }

    #[test]
    fn test_table_meta_from_yaml() {
        let yaml = "name: EVENT\nindexes:\n  - unique: true\n    columns: [DAY, SEQ]\ndeploy:\n  migrate: true\n";
        let table: TableMeta = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(table.name, "EVENT");
        assert_eq!(table.indexes, vec![IndexMeta::new("", true, "DAY, SEQ")]);
        assert!(table.deploy.migrate);
        assert!(table.deploy.create);
        assert!(table.creation_suffix.is_empty());
    }

    #[test]
    fn test_deploy_flag_defaults() {
        let flags = DeployFlags::default();
        assert!(flags.deploy && flags.create);
        assert!(!flags.drop && !flags.truncate && !flags.migrate);
        assert!(!DeployFlags::disabled().deploy);
    }

    #[test]
    fn test_short_type_name() {
        struct Local;
        assert_eq!(short_type_name::<Local>(), "Local");
        assert_eq!(short_type_name::<String>(), "String");
    }
}
