//! Descriptor registry keyed by entity type

use crate::errors::{MappingError, Result};
use crate::model::metadata::short_type_name;
use crate::model::{EntityDescriptor, EntitySchema};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

struct Registration {
    schema: Arc<EntitySchema>,
    descriptor: Arc<dyn Any + Send + Sync>,
}

/// Registered descriptors, remembering registration order
#[derive(Default)]
pub struct Registry {
    entries: HashMap<TypeId, Registration>,
    order: Vec<TypeId>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the descriptor of `T`
    pub fn insert<T: 'static>(&mut self, descriptor: EntityDescriptor<T>) -> Arc<EntityDescriptor<T>> {
        let type_id = TypeId::of::<T>();
        let descriptor = Arc::new(descriptor);
        let registration = Registration {
            schema: Arc::clone(descriptor.schema()),
            descriptor: descriptor.clone(),
        };
        if self.entries.insert(type_id, registration).is_none() {
            self.order.push(type_id);
        }
        descriptor
    }

    /// Descriptor of `T`
    ///
    /// # Errors
    ///
    /// `NotEntity` when `T` was never registered.
    pub fn get<T: 'static>(&self) -> Result<Arc<EntityDescriptor<T>>> {
        self.entries
            .get(&TypeId::of::<T>())
            .and_then(|r| Arc::clone(&r.descriptor).downcast::<EntityDescriptor<T>>().ok())
            .ok_or_else(|| {
                MappingError::NotEntity {
                    entity_type: short_type_name::<T>().to_string(),
                }
                .into()
            })
    }

    pub fn contains<T: 'static>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<T>())
    }

    /// Schemas in registration order
    pub fn schemas(&self) -> impl Iterator<Item = &Arc<EntitySchema>> {
        self.order
            .iter()
            .filter_map(move |id| self.entries.get(id).map(|r| &r.schema))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
