//! DDL generation and schema deployment
//!
//! Renders CREATE TABLE text from an [`EntitySchema`] and reconciles a live
//! table with it according to the table's [`DeployFlags`]:
//!
//! 0. `deploy` unset: nothing happens
//! 1. probe for the table
//! 2. exists and `drop`: DROP TABLE, the table now counts as absent
//! 3. otherwise exists and `truncate`: TRUNCATE TABLE
//! 4. still exists and `migrate`: drop live-only columns, add declared-only
//!    columns, redefine enum columns whose value list changed
//! 5. absent and `create`: CREATE TABLE
//!
//! The first failing statement aborts the remaining steps. Migration is not
//! transactional.

use crate::errors::{schema_error, Result, RkError};
use crate::model::{DeployFlags, EntitySchema, FieldDescriptor};
use crate::resource::Connection;
use crate::value::{enum_definition, ValueConverter};

/// One step executed while deploying a table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployAction {
    Dropped,
    Truncated,
    DroppedColumns(Vec<String>),
    AddedColumns(Vec<String>),
    RedefinedEnum { column: String, values: Vec<String> },
    Created,
}

/// Result of deploying one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployOutcome {
    table: String,
    skipped: bool,
    actions: Vec<DeployAction>,
    statements: Vec<String>,
}

impl DeployOutcome {
    fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            skipped: false,
            actions: Vec::new(),
            statements: Vec::new(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// `deploy` flag was unset
    pub fn is_skipped(&self) -> bool {
        self.skipped
    }

    pub fn actions(&self) -> &[DeployAction] {
        &self.actions
    }

    /// Data-definition statements executed, in order
    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    pub fn has_action(&self, action: &DeployAction) -> bool {
        self.actions.contains(action)
    }
}

/// Per-table results of deploying every registered entity, in registration order
#[derive(Debug, Default)]
pub struct DeployReport {
    results: Vec<(String, Result<DeployOutcome>)>,
}

impl DeployReport {
    pub(crate) fn push(&mut self, table: &str, result: Result<DeployOutcome>) {
        self.results.push((table.to_string(), result));
    }

    pub fn results(&self) -> &[(String, Result<DeployOutcome>)] {
        &self.results
    }

    pub fn outcome(&self, table: &str) -> Option<&Result<DeployOutcome>> {
        self.results
            .iter()
            .find(|(name, _)| name == table)
            .map(|(_, result)| result)
    }

    pub fn failures(&self) -> impl Iterator<Item = &RkError> {
        self.results.iter().filter_map(|(_, r)| r.as_ref().err())
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }

    /// All outcomes, or the first failure
    pub fn into_result(self) -> Result<Vec<DeployOutcome>> {
        self.results.into_iter().map(|(_, r)| r).collect()
    }
}

/// `<name> <type> [NOT] NULL`, or `<name> <override>` for explicit column definitions
pub fn column_clause(field: &FieldDescriptor, converter: &dyn ValueConverter) -> Result<String> {
    if let Some(definition) = field.column_definition() {
        return Ok(format!("{} {}", field.name(), definition));
    }
    let type_text = converter.storage_type(field.sql_type())?;
    let nullability = if field.is_nullable() { "NULL" } else { "NOT NULL" };
    Ok(format!("{} {} {}", field.name(), type_text, nullability))
}

/// Full CREATE TABLE statement for `schema`
pub fn create_table_sql(schema: &EntitySchema, converter: &dyn ValueConverter) -> Result<String> {
    let table = schema.table();
    let clauses = schema
        .fields()
        .iter()
        .map(|f| column_clause(f, converter))
        .collect::<Result<Vec<_>>>()?;

    let mut sql = format!("CREATE TABLE {} ({}", table.name(), clauses.join(", "));

    if !schema.primary_keys().is_empty() {
        let keys: Vec<&str> = schema.primary_key_fields().map(|f| f.name()).collect();
        sql.push_str(&format!(", PRIMARY KEY ({})", keys.join(", ")));
    }

    for (i, index) in table.indexes().iter().enumerate() {
        let kind = if index.is_unique() { "UNIQUE KEY" } else { "KEY" };
        sql.push_str(&format!(
            ", {} {} ({})",
            kind,
            index.resolved_name(table.name(), i + 1),
            index.columns().join(", ")
        ));
    }

    sql.push(')');
    if !table.creation_suffix().is_empty() {
        sql.push(' ');
        sql.push_str(table.creation_suffix());
    }
    Ok(sql)
}

/// Deploy `schema` using its declared flags
///
/// # Errors
///
/// Schema error carrying the table and the failing statement.
pub fn deploy(
    schema: &EntitySchema,
    conn: &mut dyn Connection,
    converter: &dyn ValueConverter,
) -> Result<DeployOutcome> {
    deploy_with_flags(schema, schema.table().deploy(), conn, converter)
}

/// Deploy `schema` with explicit flags in place of the declared ones
///
/// # Errors
///
/// Schema error carrying the table and the failing statement.
pub fn deploy_with_flags(
    schema: &EntitySchema,
    flags: DeployFlags,
    conn: &mut dyn Connection,
    converter: &dyn ValueConverter,
) -> Result<DeployOutcome> {
    let table = schema.table().name();
    let mut outcome = DeployOutcome::new(table);

    if !flags.deploy {
        outcome.skipped = true;
        return Ok(outcome);
    }

    let mut exists = conn
        .table_exists(table)
        .map_err(|e| into_schema_error(table, e))?;
    tracing::debug!(op = "deploy", table, exists, "deploying table");

    if exists {
        if flags.drop {
            execute(conn, &mut outcome, format!("DROP TABLE {}", table))?;
            outcome.actions.push(DeployAction::Dropped);
            exists = false;
        } else if flags.truncate {
            execute(conn, &mut outcome, format!("TRUNCATE TABLE {}", table))?;
            outcome.actions.push(DeployAction::Truncated);
        }
    }

    if exists && flags.migrate {
        migrate(schema, conn, converter, &mut outcome)?;
    }

    if !exists && flags.create {
        let sql = create_table_sql(schema, converter).map_err(|e| into_schema_error(table, e))?;
        execute(conn, &mut outcome, sql)?;
        outcome.actions.push(DeployAction::Created);
    }

    Ok(outcome)
}

fn migrate(
    schema: &EntitySchema,
    conn: &mut dyn Connection,
    converter: &dyn ValueConverter,
    outcome: &mut DeployOutcome,
) -> Result<()> {
    let table = schema.table().name();
    let live = conn
        .describe_columns(table)
        .map_err(|e| into_schema_error(table, e))?;

    // Live columns the entity no longer declares
    let dropped: Vec<String> = live
        .iter()
        .filter(|c| !schema.fields().iter().any(|f| f.name() == c.name))
        .map(|c| c.name.clone())
        .collect();
    if !dropped.is_empty() {
        let clauses: Vec<String> = dropped.iter().map(|c| format!("DROP COLUMN {}", c)).collect();
        execute(
            conn,
            outcome,
            format!("ALTER TABLE {} {}", table, clauses.join(", ")),
        )?;
        outcome.actions.push(DeployAction::DroppedColumns(dropped));
    }

    // Declared columns missing from the live table
    let added: Vec<&FieldDescriptor> = schema
        .fields()
        .iter()
        .filter(|f| !live.iter().any(|c| c.name == f.name()))
        .collect();
    if !added.is_empty() {
        let clauses = added
            .iter()
            .map(|f| column_clause(f, converter).map(|clause| format!("ADD COLUMN {}", clause)))
            .collect::<Result<Vec<_>>>()
            .map_err(|e| into_schema_error(table, e))?;
        execute(
            conn,
            outcome,
            format!("ALTER TABLE {} {}", table, clauses.join(", ")),
        )?;
        outcome.actions.push(DeployAction::AddedColumns(
            added.iter().map(|f| f.name().to_string()).collect(),
        ));
    }

    // Enum columns present on both sides whose value list differs
    for column in &live {
        let Some(field) = schema.fields().iter().find(|f| f.name() == column.name) else {
            continue;
        };
        let Some(declared) = field.enum_values() else {
            continue;
        };
        let live_values = converter
            .live_enum_values(&column.name, &column.column_type)
            .map_err(|e| e.with_table(table))?;
        let Some(live_values) = live_values else {
            continue;
        };
        if live_values.as_slice() == declared {
            continue;
        }
        execute(
            conn,
            outcome,
            format!(
                "ALTER TABLE {} CHANGE {} {} {}",
                table,
                column.name,
                column.name,
                enum_definition(declared)
            ),
        )?;
        outcome.actions.push(DeployAction::RedefinedEnum {
            column: column.name.clone(),
            values: declared.to_vec(),
        });
    }

    Ok(())
}

fn execute(conn: &mut dyn Connection, outcome: &mut DeployOutcome, sql: String) -> Result<()> {
    tracing::debug!(op = "deploy", table = %outcome.table, sql = %sql, "executing DDL");
    conn.execute(&sql)
        .map_err(|e| schema_error(&outcome.table, &sql, e))?;
    outcome.statements.push(sql);
    Ok(())
}

fn into_schema_error(table: &str, err: RkError) -> RkError {
    let sql = err.sql().unwrap_or_default().to_string();
    schema_error(table, &sql, err)
}
