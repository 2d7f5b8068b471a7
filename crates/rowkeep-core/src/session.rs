//! Identity-tracked persistence session
//!
//! The session is a minimal unit of work. Every instance it loads (or inserts
//! with a generated key) is handed out as a [`Managed<T>`] carrying a handle;
//! the session keeps a baseline snapshot per handle and diffs the live
//! instance against it on `persist`, so only changed columns are written.
//!
//! ## Logging Ownership
//!
//! Public operations own lifecycle logging:
//! - `log_op_start!` at entry
//! - `log_op_end!` on success
//! - `log_op_error!` on failure
//!
//! Statement text is logged with `tracing::debug!()` tagged with the
//! operation name.
//!
//! ## Connections
//!
//! Every operation has a `*_in` variant running on a caller-supplied
//! connection (e.g. [`Transaction::connection`]). The plain variant acquires a
//! connection from the factory and releases it when it returns, on every path.

use crate::ddl::{self, DeployReport};
use crate::errors::{MappingError, Result, RkError};
use crate::model::metadata::short_type_name;
use crate::model::{DeployFlags, Entity, EntityDescriptor, EntitySchema};
use crate::registry::Registry;
use crate::resource::{Connection, ConnectionFactory, KeyRetrieval, Row, Transaction};
use crate::value::{MySqlConverter, Value, ValueConverter};
use crate::{log_op_end, log_op_error, log_op_start};
use std::any::TypeId;
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Weak};
use std::time::Instant;

/// Session-issued identity of a tracked instance
#[derive(Debug)]
pub struct Handle {
    id: u64,
}

impl Handle {
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// A caller-owned entity instance, possibly tracked by a session
///
/// Dropping the last `Managed<T>` for a handle releases the session's
/// snapshot on its next operation.
pub struct Managed<T> {
    entity: T,
    handle: Option<Arc<Handle>>,
}

impl<T> Managed<T> {
    /// Wrap a new, untracked instance
    pub fn new(entity: T) -> Self {
        Self {
            entity,
            handle: None,
        }
    }

    /// Id of the session handle, if one was issued
    pub fn handle_id(&self) -> Option<u64> {
        self.handle.as_ref().map(|h| h.id)
    }

    pub fn into_inner(self) -> T {
        self.entity
    }
}

impl<T> From<T> for Managed<T> {
    fn from(entity: T) -> Self {
        Self::new(entity)
    }
}

impl<T> Deref for Managed<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.entity
    }
}

impl<T> DerefMut for Managed<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.entity
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Managed<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Managed")
            .field("entity", &self.entity)
            .field("handle", &self.handle_id())
            .finish()
    }
}

/// What `persist` did
#[derive(Debug, Clone, PartialEq)]
pub enum Persisted {
    /// Row inserted; `key` is the generated key, when one was requested
    Inserted { key: Option<Value> },
    /// Row updated; names the changed columns in column order
    Updated { columns: Vec<String> },
    /// Tracked instance matched its baseline, no statement issued
    Unchanged,
}

struct Snapshot {
    type_id: TypeId,
    handle: Weak<Handle>,
    baseline: Vec<Value>,
}

/// Identity-tracked persistence session
pub struct Session {
    factory: Arc<dyn ConnectionFactory>,
    converter: Arc<dyn ValueConverter>,
    registry: Registry,
    identity: HashMap<u64, Snapshot>,
    next_handle: u64,
    deploy_overrides: HashMap<String, DeployFlags>,
}

impl Session {
    /// Session using the MySQL value converter
    pub fn new(factory: Arc<dyn ConnectionFactory>) -> Self {
        Self {
            factory,
            converter: Arc::new(MySqlConverter),
            registry: Registry::new(),
            identity: HashMap::new(),
            next_handle: 1,
            deploy_overrides: HashMap::new(),
        }
    }

    pub fn with_converter(mut self, converter: Arc<dyn ValueConverter>) -> Self {
        self.converter = converter;
        self
    }

    pub fn converter(&self) -> &dyn ValueConverter {
        self.converter.as_ref()
    }

    // ===== Registration =====

    /// Build and register the descriptor of an entity type
    ///
    /// # Errors
    ///
    /// Configuration error when the type's metadata is incomplete.
    pub fn register<T: Entity>(&mut self) -> Result<Arc<EntityDescriptor<T>>> {
        let descriptor = EntityDescriptor::<T>::of()
            .map_err(|e| e.in_context("register", short_type_name::<T>()))?;
        Ok(self.register_descriptor(descriptor))
    }

    /// Register an already built descriptor, replacing any previous one for `T`
    ///
    /// Instances of `T` tracked under a replaced descriptor become untracked,
    /// their baselines follow the old field list.
    pub fn register_descriptor<T: 'static>(
        &mut self,
        descriptor: EntityDescriptor<T>,
    ) -> Arc<EntityDescriptor<T>> {
        let schema = Arc::clone(descriptor.schema());
        let replaced = self.registry.contains::<T>();
        let descriptor = self.registry.insert(descriptor);
        let released = if replaced {
            let type_id = TypeId::of::<T>();
            let before = self.identity.len();
            self.identity.retain(|_, s| s.type_id != type_id);
            before - self.identity.len()
        } else {
            0
        };
        tracing::debug!(
            op = "register",
            entity_type = schema.type_name(),
            table = schema.table().name(),
            replaced,
            released,
            "entity registered"
        );
        descriptor
    }

    /// Descriptor of a registered entity type
    ///
    /// # Errors
    ///
    /// `NotEntity` when `T` was never registered.
    pub fn descriptor<T: 'static>(&self) -> Result<Arc<EntityDescriptor<T>>> {
        self.registry.get::<T>()
    }

    /// Replace the deploy flags of `table` for subsequent deploys
    pub fn override_deploy_flags(&mut self, table: impl Into<String>, flags: DeployFlags) {
        self.deploy_overrides.insert(table.into(), flags);
    }

    // ===== Deployment =====

    /// Deploy every registered table on a fresh connection
    ///
    /// # Errors
    ///
    /// Fails only when no connection can be acquired; per-table failures are
    /// reported in the [`DeployReport`].
    pub fn deploy(&mut self) -> Result<DeployReport> {
        let mut conn = self.open("deploy")?;
        Ok(self.deploy_in(conn.as_mut()))
    }

    /// Deploy every registered table in registration order
    ///
    /// A failing table does not stop the others.
    pub fn deploy_in(&mut self, conn: &mut dyn Connection) -> DeployReport {
        log_op_start!("deploy", tables = self.registry.len());
        let start = Instant::now();

        let mut report = DeployReport::default();
        for schema in self.registry.schemas() {
            let table = schema.table().name();
            let flags = self.deploy_flags(schema);
            let result = ddl::deploy_with_flags(schema, flags, conn, self.converter.as_ref())
                .map_err(|e| e.in_context("deploy", schema.type_name()));
            match &result {
                Ok(outcome) => tracing::debug!(
                    op = "deploy",
                    table,
                    skipped = outcome.is_skipped(),
                    actions = ?outcome.actions(),
                    "table deployed"
                ),
                Err(err) => tracing::warn!(op = "deploy", table, error = %err, "table deploy failed"),
            }
            report.push(table, result);
        }

        log_op_end!(
            "deploy",
            duration_ms = start.elapsed().as_millis() as u64,
            tables = report.results().len(),
            failed = report.failures().count()
        );
        report
    }

    fn deploy_flags(&self, schema: &EntitySchema) -> DeployFlags {
        self.deploy_overrides
            .get(schema.table().name())
            .copied()
            .unwrap_or_else(|| schema.table().deploy())
    }

    // ===== Identity map =====

    /// Whether `managed` is tracked by this session
    pub fn is_tracked<T: 'static>(&self, managed: &Managed<T>) -> bool {
        self.tracked_id(managed).is_some()
    }

    /// Number of live tracked instances
    pub fn tracked_count(&self) -> usize {
        self.identity
            .values()
            .filter(|s| s.handle.strong_count() > 0)
            .count()
    }

    /// Stop tracking `managed`; returns whether it was tracked
    ///
    /// # Errors
    ///
    /// `NotEntity` when `T` was never registered.
    pub fn detach<T: 'static>(&mut self, managed: &mut Managed<T>) -> Result<bool> {
        self.registry
            .get::<T>()
            .map_err(|e| e.in_context("detach", short_type_name::<T>()))?;
        let was_tracked = self.untrack(managed);
        tracing::debug!(op = "detach", entity_type = short_type_name::<T>(), was_tracked);
        Ok(was_tracked)
    }

    /// Forget every tracked instance
    pub fn clear(&mut self) {
        let released = self.identity.len();
        self.identity.clear();
        tracing::debug!(op = "clear", released, "identity map cleared");
    }

    fn tracked_id<T: 'static>(&self, managed: &Managed<T>) -> Option<u64> {
        let handle = managed.handle.as_ref()?;
        let snapshot = self.identity.get(&handle.id)?;
        let same_handle = std::ptr::eq(snapshot.handle.as_ptr(), Arc::as_ptr(handle));
        (same_handle && snapshot.type_id == TypeId::of::<T>()).then_some(handle.id)
    }

    fn track<T: 'static>(&mut self, entity: T, baseline: Vec<Value>) -> Managed<T> {
        let mut managed = Managed::new(entity);
        self.attach(&mut managed, baseline);
        managed
    }

    fn attach<T: 'static>(&mut self, managed: &mut Managed<T>, baseline: Vec<Value>) {
        let handle = Arc::new(Handle {
            id: self.next_handle,
        });
        self.next_handle += 1;
        self.identity.insert(
            handle.id,
            Snapshot {
                type_id: TypeId::of::<T>(),
                handle: Arc::downgrade(&handle),
                baseline,
            },
        );
        managed.handle = Some(handle);
    }

    fn untrack<T: 'static>(&mut self, managed: &mut Managed<T>) -> bool {
        let tracked = self.tracked_id(managed);
        if let Some(id) = tracked {
            self.identity.remove(&id);
        }
        managed.handle = None;
        tracked.is_some()
    }

    /// Drop snapshots whose instances the caller has released
    fn prune(&mut self) {
        let before = self.identity.len();
        self.identity.retain(|_, s| s.handle.strong_count() > 0);
        let pruned = before - self.identity.len();
        if pruned > 0 {
            tracing::debug!(pruned, "released snapshots of dropped instances");
        }
    }

    // ===== Queries =====

    /// Load the row with primary key `key`
    ///
    /// # Errors
    ///
    /// `NotEntity`, `Cardinality` unless exactly one primary key, storage and
    /// conversion failures.
    pub fn find_by_key<T: 'static>(&mut self, key: impl Into<Value>) -> Result<Option<Managed<T>>> {
        let mut conn = self.open("find_by_key")?;
        self.find_by_key_in(conn.as_mut(), key)
    }

    pub fn find_by_key_in<T: 'static>(
        &mut self,
        conn: &mut dyn Connection,
        key: impl Into<Value>,
    ) -> Result<Option<Managed<T>>> {
        let entity_type = short_type_name::<T>();
        log_op_start!("find_by_key", entity_type = entity_type);
        let start = Instant::now();

        let found = self
            .find_by_key_impl::<T>(conn, key.into())
            .map_err(log_failure("find_by_key", entity_type, start))?;

        log_op_end!(
            "find_by_key",
            duration_ms = start.elapsed().as_millis() as u64,
            entity_type = entity_type,
            row_count = u64::from(found.is_some())
        );
        Ok(found)
    }

    fn find_by_key_impl<T: 'static>(
        &mut self,
        conn: &mut dyn Connection,
        key: Value,
    ) -> Result<Option<Managed<T>>> {
        let descriptor = self.registry.get::<T>()?;
        let sql = descriptor.schema().select_by_key_sql()?;
        let rows = self.query(conn, "find_by_key", sql, &[key])?;
        self.load_first(&descriptor, rows)
    }

    /// Load the first row whose `column` equals `value`
    ///
    /// # Errors
    ///
    /// `NotEntity`, configuration error for an unknown column, storage and
    /// conversion failures.
    pub fn find_by_field<T: 'static>(
        &mut self,
        column: &str,
        value: impl Into<Value>,
    ) -> Result<Option<Managed<T>>> {
        let mut conn = self.open("find_by_field")?;
        self.find_by_field_in(conn.as_mut(), column, value)
    }

    pub fn find_by_field_in<T: 'static>(
        &mut self,
        conn: &mut dyn Connection,
        column: &str,
        value: impl Into<Value>,
    ) -> Result<Option<Managed<T>>> {
        let entity_type = short_type_name::<T>();
        log_op_start!("find_by_field", entity_type = entity_type, column = column);
        let start = Instant::now();

        let found = self
            .find_by_field_impl::<T>(conn, column, value.into())
            .map_err(log_failure("find_by_field", entity_type, start))?;

        log_op_end!(
            "find_by_field",
            duration_ms = start.elapsed().as_millis() as u64,
            entity_type = entity_type,
            row_count = u64::from(found.is_some())
        );
        Ok(found)
    }

    fn find_by_field_impl<T: 'static>(
        &mut self,
        conn: &mut dyn Connection,
        column: &str,
        value: Value,
    ) -> Result<Option<Managed<T>>> {
        let descriptor = self.registry.get::<T>()?;
        let sql = descriptor.schema().select_by_field_sql(column)?;
        let rows = self.query(conn, "find_by_field", &sql, &[value])?;
        self.load_first(&descriptor, rows)
    }

    /// Load every row of a caller-supplied query
    ///
    /// Columns are read by position in descriptor column order.
    ///
    /// # Errors
    ///
    /// `NotEntity`, storage and conversion failures.
    pub fn find_all<T: 'static>(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Managed<T>>> {
        let mut conn = self.open("find_all")?;
        self.find_all_in(conn.as_mut(), sql, params)
    }

    pub fn find_all_in<T: 'static>(
        &mut self,
        conn: &mut dyn Connection,
        sql: &str,
        params: &[Value],
    ) -> Result<Vec<Managed<T>>> {
        let entity_type = short_type_name::<T>();
        log_op_start!("find_all", entity_type = entity_type);
        let start = Instant::now();

        let found = self
            .find_all_impl::<T>(conn, sql, params)
            .map_err(log_failure("find_all", entity_type, start))?;

        log_op_end!(
            "find_all",
            duration_ms = start.elapsed().as_millis() as u64,
            entity_type = entity_type,
            row_count = found.len() as u64
        );
        Ok(found)
    }

    fn find_all_impl<T: 'static>(
        &mut self,
        conn: &mut dyn Connection,
        sql: &str,
        params: &[Value],
    ) -> Result<Vec<Managed<T>>> {
        let descriptor = self.registry.get::<T>()?;
        let rows = self.query(conn, "find_all", sql, params)?;
        self.prune();
        rows.iter()
            .map(|row| {
                let (entity, baseline) = self.load_row(&descriptor, row)?;
                Ok(self.track(entity, baseline))
            })
            .collect()
    }

    fn load_first<T: 'static>(
        &mut self,
        descriptor: &EntityDescriptor<T>,
        rows: Vec<Row>,
    ) -> Result<Option<Managed<T>>> {
        let Some(row) = rows.first() else {
            return Ok(None);
        };
        self.prune();
        let (entity, baseline) = self.load_row(descriptor, row)?;
        Ok(Some(self.track(entity, baseline)))
    }

    fn load_row<T>(&self, descriptor: &EntityDescriptor<T>, row: &Row) -> Result<(T, Vec<Value>)> {
        let mut entity = descriptor.new_instance();
        let baseline = self.hydrate(descriptor, &mut entity, row)?;
        Ok((entity, baseline))
    }

    /// Overwrite every mapped field from `row`, returning the new baseline
    fn hydrate<T>(&self, descriptor: &EntityDescriptor<T>, entity: &mut T, row: &Row) -> Result<Vec<Value>> {
        for (ordinal, field) in descriptor.schema().fields().iter().enumerate() {
            let value = self.converter.read_column(row, field, ordinal)?;
            descriptor.set(entity, ordinal, value)?;
        }
        Ok(descriptor
            .values(entity)
            .iter()
            .map(|v| self.converter.deep_copy(v))
            .collect())
    }

    // ===== Writes =====

    /// Insert an untracked instance or write the changed columns of a tracked one
    ///
    /// # Errors
    ///
    /// - `NotEntity`: type not registered
    /// - `InsertFailed`: no affected rows, or requested generated key missing
    /// - `ConstraintViolation`: primary key or non-updatable field changed
    /// - `Cardinality`: update of an entity without primary key
    pub fn persist<T: 'static>(&mut self, managed: &mut Managed<T>) -> Result<Persisted> {
        let mut conn = self.open("persist")?;
        self.persist_in(conn.as_mut(), managed)
    }

    pub fn persist_in<T: 'static>(
        &mut self,
        conn: &mut dyn Connection,
        managed: &mut Managed<T>,
    ) -> Result<Persisted> {
        let entity_type = short_type_name::<T>();
        log_op_start!("persist", entity_type = entity_type);
        let start = Instant::now();

        let outcome = self
            .persist_impl(conn, managed)
            .map_err(log_failure("persist", entity_type, start))?;

        log_op_end!(
            "persist",
            duration_ms = start.elapsed().as_millis() as u64,
            entity_type = entity_type,
            outcome = ?outcome
        );
        Ok(outcome)
    }

    fn persist_impl<T: 'static>(
        &mut self,
        conn: &mut dyn Connection,
        managed: &mut Managed<T>,
    ) -> Result<Persisted> {
        let descriptor = self.registry.get::<T>()?;
        self.prune();
        match self.tracked_id(managed) {
            Some(id) => self.update(conn, &descriptor, managed, id),
            None => self.insert(conn, &descriptor, managed),
        }
    }

    fn insert<T: 'static>(
        &mut self,
        conn: &mut dyn Connection,
        descriptor: &EntityDescriptor<T>,
        managed: &mut Managed<T>,
    ) -> Result<Persisted> {
        let schema = descriptor.schema();
        let table = schema.table().name();
        let sql = schema.insert_sql();
        let key_field = schema.generated_key_field();
        let retrieval = match key_field {
            Some(_) => KeyRetrieval::Generated,
            None => KeyRetrieval::None,
        };
        let values = descriptor.values(&managed.entity);

        tracing::debug!(op = "persist", sql, "executing insert");
        let generated = {
            let mut statement = conn.prepare(sql, retrieval).map_err(at_sql(sql))?;
            let insertable = schema
                .fields()
                .iter()
                .zip(&values)
                .filter(|(field, _)| field.is_insertable());
            for (index, (_, value)) in insertable.enumerate() {
                self.converter
                    .write_parameter(value, statement.as_mut(), index + 1)
                    .map_err(at_sql(sql))?;
            }
            let affected = statement.execute_update().map_err(at_sql(sql))?;
            if affected == 0 {
                return Err(RkError::from(MappingError::NoAffectedRows {
                    table: table.to_string(),
                })
                .with_sql(sql));
            }
            match key_field {
                Some(_) => Some(statement.generated_key().map_err(at_sql(sql))?.ok_or_else(
                    || {
                        RkError::from(MappingError::NoGeneratedKey {
                            table: table.to_string(),
                        })
                        .with_sql(sql)
                    },
                )?),
                None => None,
            }
        };

        // Without a generated key the instance cannot be identified, it stays untracked
        let (Some(key_index), Some(raw_key)) = (key_field, generated) else {
            return Ok(Persisted::Inserted { key: None });
        };

        let key = self.converter.coerce(raw_key, &schema.fields()[key_index])?;
        descriptor.set(&mut managed.entity, key_index, key.clone())?;

        // Baseline: what was inserted plus the key, defaults for the rest
        let defaults = descriptor.values(&descriptor.new_instance());
        let baseline = schema
            .fields()
            .iter()
            .zip(values.iter().zip(defaults))
            .enumerate()
            .map(|(i, (field, (inserted, default)))| {
                if i == key_index {
                    self.converter.deep_copy(&key)
                } else if field.is_insertable() {
                    self.converter.deep_copy(inserted)
                } else {
                    default
                }
            })
            .collect();
        self.attach(managed, baseline);

        Ok(Persisted::Inserted { key: Some(key) })
    }

    fn update<T: 'static>(
        &mut self,
        conn: &mut dyn Connection,
        descriptor: &EntityDescriptor<T>,
        managed: &Managed<T>,
        id: u64,
    ) -> Result<Persisted> {
        let schema = descriptor.schema();
        let table = schema.table().name();
        let values = descriptor.values(&managed.entity);
        let snapshot = self.identity.get(&id).ok_or_else(|| -> RkError {
            MappingError::NotTracked {
                entity_type: schema.type_name().to_string(),
            }
            .into()
        })?;

        let mut changed = Vec::new();
        for (i, field) in schema.fields().iter().enumerate() {
            if values[i].same_as(&snapshot.baseline[i]) {
                continue;
            }
            if field.is_primary_key() {
                return Err(MappingError::UpdatePrimaryKey {
                    table: table.to_string(),
                    field: field.name().to_string(),
                }
                .into());
            }
            if !field.is_updatable() {
                return Err(MappingError::FieldNotUpdatable {
                    table: table.to_string(),
                    field: field.name().to_string(),
                }
                .into());
            }
            changed.push(i);
        }

        if changed.is_empty() {
            tracing::debug!(op = "persist", table, "no changes, update skipped");
            return Ok(Persisted::Unchanged);
        }
        if schema.primary_keys().is_empty() {
            return Err(MappingError::PrimaryKeyCardinality {
                table: table.to_string(),
                found: 0,
            }
            .into());
        }

        let assignments: Vec<String> = changed
            .iter()
            .map(|&i| format!("{}=?", schema.fields()[i].name()))
            .collect();
        let predicates: Vec<String> = schema
            .primary_key_fields()
            .map(|f| format!("{}=?", f.name()))
            .collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            table,
            assignments.join(", "),
            predicates.join(" AND ")
        );

        let params = changed
            .iter()
            .chain(schema.primary_keys())
            .map(|&i| &values[i]);
        self.execute_update(conn, "persist", &sql, params)?;

        Ok(Persisted::Updated {
            columns: changed
                .iter()
                .map(|&i| schema.fields()[i].name().to_string())
                .collect(),
        })
    }

    /// Reload a tracked instance and its baseline from the store
    ///
    /// # Errors
    ///
    /// `NotTracked` for untracked instances, `Cardinality` unless exactly one
    /// primary key, storage error when the row no longer exists.
    pub fn refresh<T: 'static>(&mut self, managed: &mut Managed<T>) -> Result<()> {
        let mut conn = self.open("refresh")?;
        self.refresh_in(conn.as_mut(), managed)
    }

    pub fn refresh_in<T: 'static>(
        &mut self,
        conn: &mut dyn Connection,
        managed: &mut Managed<T>,
    ) -> Result<()> {
        let entity_type = short_type_name::<T>();
        log_op_start!("refresh", entity_type = entity_type);
        let start = Instant::now();

        self.refresh_impl(conn, managed)
            .map_err(log_failure("refresh", entity_type, start))?;

        log_op_end!(
            "refresh",
            duration_ms = start.elapsed().as_millis() as u64,
            entity_type = entity_type
        );
        Ok(())
    }

    fn refresh_impl<T: 'static>(
        &mut self,
        conn: &mut dyn Connection,
        managed: &mut Managed<T>,
    ) -> Result<()> {
        let descriptor = self.registry.get::<T>()?;
        let schema = descriptor.schema();
        let id = self.tracked_id(managed).ok_or_else(|| -> RkError {
            MappingError::NotTracked {
                entity_type: schema.type_name().to_string(),
            }
            .into()
        })?;
        let key_index = schema.single_primary_key()?;
        let sql = schema.select_by_key_sql()?;

        let key = descriptor.get(&managed.entity, key_index);
        let rows = self.query(conn, "refresh", sql, &[key])?;
        let row = rows.first().ok_or_else(|| -> RkError {
            RkError::from(MappingError::RowVanished {
                table: schema.table().name().to_string(),
            })
            .with_sql(sql)
        })?;

        let baseline = self.hydrate(&descriptor, &mut managed.entity, row)?;
        if let Some(snapshot) = self.identity.get_mut(&id) {
            snapshot.baseline = baseline;
        }
        Ok(())
    }

    /// Delete the row of `managed` by its primary key and stop tracking it
    ///
    /// Untracked instances can be removed as long as their key is set.
    /// Returns the number of deleted rows.
    ///
    /// # Errors
    ///
    /// `NotEntity`, `Cardinality` unless exactly one primary key, storage failures.
    pub fn remove<T: 'static>(&mut self, managed: &mut Managed<T>) -> Result<u64> {
        let mut conn = self.open("remove")?;
        self.remove_in(conn.as_mut(), managed)
    }

    pub fn remove_in<T: 'static>(
        &mut self,
        conn: &mut dyn Connection,
        managed: &mut Managed<T>,
    ) -> Result<u64> {
        let entity_type = short_type_name::<T>();
        log_op_start!("remove", entity_type = entity_type);
        let start = Instant::now();

        let deleted = self
            .remove_impl(conn, managed)
            .map_err(log_failure("remove", entity_type, start))?;

        log_op_end!(
            "remove",
            duration_ms = start.elapsed().as_millis() as u64,
            entity_type = entity_type,
            row_count = deleted
        );
        Ok(deleted)
    }

    fn remove_impl<T: 'static>(
        &mut self,
        conn: &mut dyn Connection,
        managed: &mut Managed<T>,
    ) -> Result<u64> {
        let descriptor = self.registry.get::<T>()?;
        let schema = descriptor.schema();
        let key_index = schema.single_primary_key()?;
        let sql = schema.delete_by_key_sql()?;

        let key = descriptor.get(&managed.entity, key_index);
        let deleted = self.execute_update(conn, "remove", sql, [&key])?;
        self.untrack(managed);
        Ok(deleted)
    }

    // ===== Transactions =====

    /// Acquire a connection with auto-commit disabled
    ///
    /// # Errors
    ///
    /// Storage error when no connection can be acquired or configured.
    pub fn begin(&self) -> Result<Transaction> {
        log_op_start!("begin");
        let start = Instant::now();
        let tx = self
            .open("begin")
            .and_then(Transaction::begin)
            .map_err(log_failure("begin", "-", start))?;
        log_op_end!("begin", duration_ms = start.elapsed().as_millis() as u64);
        Ok(tx)
    }

    pub fn commit(&self, tx: Transaction) -> Result<()> {
        log_op_start!("commit");
        let start = Instant::now();
        tx.commit().map_err(log_failure("commit", "-", start))?;
        log_op_end!("commit", duration_ms = start.elapsed().as_millis() as u64);
        Ok(())
    }

    pub fn rollback(&self, tx: Transaction) -> Result<()> {
        log_op_start!("rollback");
        let start = Instant::now();
        tx.rollback().map_err(log_failure("rollback", "-", start))?;
        log_op_end!("rollback", duration_ms = start.elapsed().as_millis() as u64);
        Ok(())
    }

    // ===== Statement helpers =====

    fn open(&self, op: &str) -> Result<Box<dyn Connection>> {
        self.factory.open().map_err(|e| {
            if e.op().is_none() {
                e.with_op(op)
            } else {
                e
            }
        })
    }

    fn query(
        &self,
        conn: &mut dyn Connection,
        op: &'static str,
        sql: &str,
        params: &[Value],
    ) -> Result<Vec<Row>> {
        tracing::debug!(op, sql, params = params.len(), "executing query");
        let mut statement = conn.prepare(sql, KeyRetrieval::None).map_err(at_sql(sql))?;
        for (i, value) in params.iter().enumerate() {
            self.converter
                .write_parameter(value, statement.as_mut(), i + 1)
                .map_err(at_sql(sql))?;
        }
        statement.execute_query().map_err(at_sql(sql))
    }

    fn execute_update<'v>(
        &self,
        conn: &mut dyn Connection,
        op: &'static str,
        sql: &str,
        params: impl IntoIterator<Item = &'v Value>,
    ) -> Result<u64> {
        tracing::debug!(op, sql, "executing statement");
        let mut statement = conn.prepare(sql, KeyRetrieval::None).map_err(at_sql(sql))?;
        for (i, value) in params.into_iter().enumerate() {
            self.converter
                .write_parameter(value, statement.as_mut(), i + 1)
                .map_err(at_sql(sql))?;
        }
        statement.execute_update().map_err(at_sql(sql))
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("registered", &self.registry.len())
            .field("tracked", &self.tracked_count())
            .finish_non_exhaustive()
    }
}

fn at_sql(sql: &str) -> impl FnOnce(RkError) -> RkError + '_ {
    move |e| {
        if e.sql().is_none() {
            e.with_sql(sql)
        } else {
            e
        }
    }
}

fn log_failure(
    op: &'static str,
    entity_type: &'static str,
    start: Instant,
) -> impl FnOnce(RkError) -> RkError {
    move |e| {
        let e = e.in_context(op, entity_type);
        log_op_error!(
            op,
            &e,
            duration_ms = start.elapsed().as_millis() as u64,
            entity_type = entity_type
        );
        e
    }
}
