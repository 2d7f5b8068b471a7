use crate::errors::{MappingError, Result, RkError};
use crate::model::field::FieldDescriptor;
use crate::model::metadata::{Entity, EntityMetadata, Getter, Setter};
use crate::model::table::TableDescriptor;
use crate::templates::SqlTemplates;
use crate::value::Value;
use std::sync::Arc;

/// Type-erased part of an entity descriptor
///
/// Holds everything DDL generation, SQL templates and dirty checking need
/// without knowing the entity's Rust type. Immutable once built, apart from
/// the memoized statement cache.
#[derive(Debug)]
pub struct EntitySchema {
    type_name: &'static str,
    table: TableDescriptor,
    fields: Vec<FieldDescriptor>,
    primary_keys: Vec<usize>,
    templates: SqlTemplates,
}

impl EntitySchema {
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn table(&self) -> &TableDescriptor {
        &self.table
    }

    /// Mapped fields in declaration order, which is column order
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Positions of primary-key fields within `fields()`
    pub fn primary_keys(&self) -> &[usize] {
        &self.primary_keys
    }

    pub fn primary_key_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.primary_keys.iter().map(move |&i| &self.fields[i])
    }

    /// Position of the field mapped to `column` (exact match)
    pub fn field_index(&self, column: &str) -> Result<usize> {
        self.fields
            .iter()
            .position(|f| f.name() == column)
            .ok_or_else(|| {
                MappingError::UnknownField {
                    table: self.table.name().to_string(),
                    field: column.to_string(),
                }
                .into()
            })
    }

    /// Position of the only primary-key field
    pub fn single_primary_key(&self) -> Result<usize> {
        match self.primary_keys.as_slice() {
            [only] => Ok(*only),
            keys => Err(MappingError::PrimaryKeyCardinality {
                table: self.table.name().to_string(),
                found: keys.len(),
            }
            .into()),
        }
    }

    /// Key field to fill from the store-generated key after insert
    ///
    /// Only when the table has exactly one primary key and it populates on insert.
    pub fn generated_key_field(&self) -> Option<usize> {
        match self.primary_keys.as_slice() {
            [only] if self.fields[*only].populates_on_insert() => Some(*only),
            _ => None,
        }
    }

    pub(crate) fn templates(&self) -> &SqlTemplates {
        &self.templates
    }
}

struct Accessor<T> {
    get: Getter<T>,
    set: Setter<T>,
}

/// Immutable mapping of an entity type to a table
///
/// Built once per type from its [`EntityMetadata`]; the schema half is shared
/// through an `Arc` so it can outlive any session borrowing it.
pub struct EntityDescriptor<T> {
    schema: Arc<EntitySchema>,
    accessors: Vec<Accessor<T>>,
    constructor: fn() -> T,
}

impl<T> EntityDescriptor<T> {
    /// Build a descriptor from explicit metadata
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the table metadata is missing or
    /// names no table, or when no constructor was supplied.
    pub fn build(metadata: EntityMetadata<T>) -> Result<Self> {
        let EntityMetadata {
            type_name,
            table,
            fields,
            constructor,
        } = metadata;

        let table = table
            .filter(|t| !t.name.trim().is_empty())
            .ok_or_else(|| -> RkError {
                MappingError::MissingTable {
                    entity_type: type_name.to_string(),
                }
                .into()
            })?;
        let constructor = constructor.ok_or_else(|| -> RkError {
            MappingError::MissingConstructor {
                entity_type: type_name.to_string(),
            }
            .into()
        })?;

        let mut descriptors = Vec::with_capacity(fields.len());
        let mut accessors = Vec::with_capacity(fields.len());
        let mut primary_keys = Vec::new();

        for field in fields {
            let mut descriptor = match field.column {
                Some(spec) => FieldDescriptor::from_column(field.field_name, field.sql_type, spec),
                None if field.id => FieldDescriptor::implicit_key(field.field_name, field.sql_type),
                // transient
                None => continue,
            };
            if field.id {
                descriptor.mark_primary_key();
                primary_keys.push(descriptors.len());
            }
            descriptors.push(descriptor);
            accessors.push(Accessor {
                get: field.get,
                set: field.set,
            });
        }

        let table = TableDescriptor::from_meta(table);
        tracing::debug!(
            entity_type = type_name,
            table = table.name(),
            fields = descriptors.len(),
            primary_keys = primary_keys.len(),
            "entity descriptor built"
        );

        Ok(Self {
            schema: Arc::new(EntitySchema {
                type_name,
                table,
                fields: descriptors,
                primary_keys,
                templates: SqlTemplates::default(),
            }),
            accessors,
            constructor,
        })
    }

    pub fn schema(&self) -> &Arc<EntitySchema> {
        &self.schema
    }

    /// Fresh instance from the no-argument constructor
    pub fn new_instance(&self) -> T {
        (self.constructor)()
    }

    /// Current value of every mapped field, in column order
    pub fn values(&self, entity: &T) -> Vec<Value> {
        self.accessors.iter().map(|a| (a.get)(entity)).collect()
    }

    /// Current value of the field mapped to `column`
    pub fn value_of(&self, entity: &T, column: &str) -> Result<Value> {
        let index = self.schema.field_index(column)?;
        Ok(self.get(entity, index))
    }

    pub(crate) fn get(&self, entity: &T, index: usize) -> Value {
        (self.accessors[index].get)(entity)
    }

    pub(crate) fn set(&self, entity: &mut T, index: usize, value: Value) -> Result<()> {
        (self.accessors[index].set)(entity, value).map_err(|e| {
            let field = &self.schema.fields[index];
            RkError::wrap(e.kind(), e.clone())
                .with_table(self.schema.table.name())
                .with_message(format!("Field {}: {}", field.name(), e.message()))
        })
    }
}

impl<T: Entity> EntityDescriptor<T> {
    /// Build the descriptor from the type's own metadata
    pub fn of() -> Result<Self> {
        Self::build(T::metadata())
    }
}

impl<T> std::fmt::Debug for EntityDescriptor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityDescriptor")
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}
