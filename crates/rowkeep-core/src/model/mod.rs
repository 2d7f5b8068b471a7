pub mod entity;
pub mod field;
pub mod metadata;
pub mod table;

pub use entity::{EntityDescriptor, EntitySchema};
pub use field::FieldDescriptor;
pub use metadata::{
    ColumnSpec, DeployFlags, Entity, EntityMetadata, FieldMeta, Getter, IndexMeta, Setter,
    TableMeta,
};
pub use table::{IndexDescriptor, TableDescriptor};
