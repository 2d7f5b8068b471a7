//! Shared helpers: a scripted in-memory store and sample entities

#![allow(dead_code)]

use rowkeep_core::errors::{storage_error, Result};
use rowkeep_core::{
    ColumnSpec, Connection, ConnectionFactory, Entity, EntityMetadata, FieldMeta, KeyRetrieval,
    LiveColumn, Row, SqlType, Statement, TableMeta, Value,
};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

/// A statement the fake store saw executed
#[derive(Debug, Clone, PartialEq)]
pub struct Executed {
    pub sql: String,
    pub params: Vec<Value>,
    pub keys: KeyRetrieval,
}

#[derive(Default)]
struct FakeState {
    executed: Vec<Executed>,
    tables: HashMap<String, Vec<LiveColumn>>,
    query_results: HashMap<String, VecDeque<Vec<Vec<Value>>>>,
    affected_rows: VecDeque<u64>,
    generated_keys: VecDeque<Option<Value>>,
    failures: Vec<(String, String)>,
    auto_commit_changes: Vec<bool>,
    commits: usize,
    rollbacks: usize,
    opened: usize,
    closed: usize,
}

/// Scripted store shared by every connection opened from its factory
///
/// Statements are recorded with their bound parameters. Queries answer from
/// scripted results keyed by exact SQL text; `SHOW TABLES LIKE ?` and
/// `SHOW COLUMNS FROM <t>` answer from the declared live tables.
#[derive(Clone, Default)]
pub struct FakeStore {
    state: Arc<Mutex<FakeState>>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn factory(&self) -> Arc<dyn ConnectionFactory> {
        Arc::new(FakeFactory {
            store: self.clone(),
        })
    }

    pub fn connection(&self) -> Box<dyn Connection> {
        self.lock().opened += 1;
        Box::new(FakeConnection {
            store: self.clone(),
        })
    }

    /// Declare a live table with `(name, type)` columns
    pub fn with_table(&self, table: &str, columns: &[(&str, &str)]) -> &Self {
        let columns = columns
            .iter()
            .map(|(name, column_type)| LiveColumn {
                name: name.to_string(),
                column_type: column_type.to_string(),
            })
            .collect();
        self.lock().tables.insert(table.to_string(), columns);
        self
    }

    /// Queue the rows returned by the next query with exactly this SQL
    pub fn script_query(&self, sql: &str, rows: Vec<Vec<Value>>) -> &Self {
        self.lock()
            .query_results
            .entry(sql.to_string())
            .or_default()
            .push_back(rows);
        self
    }

    /// Queue the affected-row count of the next update (default 1)
    pub fn script_affected(&self, rows: u64) -> &Self {
        self.lock().affected_rows.push_back(rows);
        self
    }

    /// Queue the generated key of the next update requesting one (default none)
    pub fn script_generated_key(&self, key: Option<Value>) -> &Self {
        self.lock().generated_keys.push_back(key);
        self
    }

    /// Fail every statement whose SQL starts with `prefix`
    pub fn fail_on(&self, prefix: &str, reason: &str) -> &Self {
        self.lock()
            .failures
            .push((prefix.to_string(), reason.to_string()));
        self
    }

    pub fn executed(&self) -> Vec<Executed> {
        self.lock().executed.clone()
    }

    pub fn statements(&self) -> Vec<String> {
        self.executed().into_iter().map(|e| e.sql).collect()
    }

    /// Executed statements other than introspection queries
    pub fn writes(&self) -> Vec<Executed> {
        self.executed()
            .into_iter()
            .filter(|e| !e.sql.starts_with("SELECT") && !e.sql.starts_with("SHOW"))
            .collect()
    }

    pub fn clear_log(&self) {
        self.lock().executed.clear();
    }

    pub fn auto_commit_changes(&self) -> Vec<bool> {
        self.lock().auto_commit_changes.clone()
    }

    pub fn commits(&self) -> usize {
        self.lock().commits
    }

    pub fn rollbacks(&self) -> usize {
        self.lock().rollbacks
    }

    pub fn opened(&self) -> usize {
        self.lock().opened
    }

    pub fn closed(&self) -> usize {
        self.lock().closed
    }
}

struct FakeFactory {
    store: FakeStore,
}

impl ConnectionFactory for FakeFactory {
    fn open(&self) -> Result<Box<dyn Connection>> {
        Ok(self.store.connection())
    }
}

pub struct FakeConnection {
    store: FakeStore,
}

impl Connection for FakeConnection {
    fn prepare(&mut self, sql: &str, keys: KeyRetrieval) -> Result<Box<dyn Statement + '_>> {
        Ok(Box::new(FakeStatement {
            store: self.store.clone(),
            sql: sql.to_string(),
            keys,
            params: BTreeMap::new(),
            generated: None,
        }))
    }

    fn set_auto_commit(&mut self, enabled: bool) -> Result<()> {
        self.store.lock().auto_commit_changes.push(enabled);
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.store.lock().commits += 1;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.store.lock().rollbacks += 1;
        Ok(())
    }
}

impl Drop for FakeConnection {
    fn drop(&mut self) {
        self.store.lock().closed += 1;
    }
}

struct FakeStatement {
    store: FakeStore,
    sql: String,
    keys: KeyRetrieval,
    params: BTreeMap<usize, Value>,
    generated: Option<Value>,
}

impl FakeStatement {
    fn record(&self) -> Result<()> {
        let mut state = self.store.lock();
        state.executed.push(Executed {
            sql: self.sql.clone(),
            params: self.params.values().cloned().collect(),
            keys: self.keys,
        });
        match state
            .failures
            .iter()
            .find(|(prefix, _)| self.sql.starts_with(prefix.as_str()))
        {
            Some((_, reason)) => Err(storage_error("execute", &self.sql, reason)),
            None => Ok(()),
        }
    }
}

impl Statement for FakeStatement {
    fn sql(&self) -> &str {
        &self.sql
    }

    fn bind(&mut self, index: usize, value: &Value) -> Result<()> {
        self.params.insert(index, value.clone());
        Ok(())
    }

    fn execute_update(&mut self) -> Result<u64> {
        self.record()?;
        let mut state = self.store.lock();
        if self.keys == KeyRetrieval::Generated {
            self.generated = state.generated_keys.pop_front().flatten();
        }
        Ok(state.affected_rows.pop_front().unwrap_or(1))
    }

    fn execute_query(&mut self) -> Result<Vec<Row>> {
        self.record()?;
        let mut state = self.store.lock();

        if self.sql == "SHOW TABLES LIKE ?" {
            let pattern: Vec<char> = match self.params.get(&1) {
                Some(Value::Text(t)) => t.chars().collect(),
                _ => Vec::new(),
            };
            let columns: Arc<[String]> = Arc::from(vec!["Tables".to_string()]);
            let mut matched: Vec<&String> = state
                .tables
                .keys()
                .filter(|name| like_matches(&pattern, &name.chars().collect::<Vec<_>>()))
                .collect();
            matched.sort();
            return Ok(matched
                .into_iter()
                .map(|name| Row::new(columns.clone(), vec![Value::Text(name.clone())]))
                .collect());
        }

        if let Some(table) = self.sql.strip_prefix("SHOW COLUMNS FROM ") {
            let columns: Arc<[String]> = Arc::from(vec!["Field".to_string(), "Type".to_string()]);
            let live = state.tables.get(table).cloned().unwrap_or_default();
            return Ok(live
                .into_iter()
                .map(|c| {
                    Row::new(
                        columns.clone(),
                        vec![Value::Text(c.name), Value::Text(c.column_type)],
                    )
                })
                .collect());
        }

        let rows = state
            .query_results
            .get_mut(&self.sql)
            .and_then(VecDeque::pop_front)
            .unwrap_or_default();
        let columns: Arc<[String]> = Arc::from(Vec::<String>::new());
        Ok(rows
            .into_iter()
            .map(|values| Row::new(columns.clone(), values))
            .collect())
    }

    fn generated_key(&mut self) -> Result<Option<Value>> {
        Ok(self.generated.take())
    }
}

// ===== Sample entities =====

/// Auto-increment key, populated on insert
#[derive(Debug, Clone, Default, PartialEq)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub age: i32,
}

impl Entity for User {
    fn metadata() -> EntityMetadata<Self> {
        EntityMetadata::new()
            .table(TableMeta::new("USER"))
            .field(
                FieldMeta::new(
                    "id",
                    SqlType::BigInt,
                    |u: &User| Value::from(u.id),
                    |u, v| {
                        u.id = v.try_into()?;
                        Ok(())
                    },
                )
                .column(
                    ColumnSpec::new()
                        .not_null()
                        .insertable(false)
                        .populate_on_insert(),
                )
                .id(),
            )
            .field(
                FieldMeta::new(
                    "name",
                    SqlType::Text,
                    |u: &User| Value::from(u.name.clone()),
                    |u, v| {
                        u.name = v.try_into()?;
                        Ok(())
                    },
                )
                .column(ColumnSpec::new().not_null()),
            )
            .field(
                FieldMeta::new(
                    "age",
                    SqlType::Int,
                    |u: &User| Value::from(u.age),
                    |u, v| {
                        u.age = v.try_into()?;
                        Ok(())
                    },
                )
                .column(ColumnSpec::new().not_null()),
            )
            .with_default_constructor()
    }
}

pub const USER_SELECT_BY_KEY: &str = "SELECT ID, NAME, AGE FROM USER WHERE ID=?";

pub fn user_row(id: i64, name: &str, age: i32) -> Vec<Value> {
    vec![Value::Int(id), Value::from(name), Value::from(age)]
}

/// Caller-assigned key, a write-once column and an enum column
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub number: String,
    pub owner: String,
    pub opened_by: String,
    pub status: String,
}

impl Default for Account {
    fn default() -> Self {
        Self {
            number: String::new(),
            owner: String::new(),
            opened_by: String::new(),
            status: "OPEN".to_string(),
        }
    }
}

impl Entity for Account {
    fn metadata() -> EntityMetadata<Self> {
        EntityMetadata::new()
            .table(TableMeta::new("ACCOUNT"))
            .field(
                FieldMeta::new(
                    "number",
                    SqlType::Text,
                    |a: &Account| Value::from(a.number.clone()),
                    |a, v| {
                        a.number = v.try_into()?;
                        Ok(())
                    },
                )
                .id(),
            )
            .field(
                FieldMeta::new(
                    "owner",
                    SqlType::Text,
                    |a: &Account| Value::from(a.owner.clone()),
                    |a, v| {
                        a.owner = v.try_into()?;
                        Ok(())
                    },
                )
                .column(ColumnSpec::new()),
            )
            .field(
                FieldMeta::new(
                    "opened_by",
                    SqlType::Text,
                    |a: &Account| Value::from(a.opened_by.clone()),
                    |a, v| {
                        a.opened_by = v.try_into()?;
                        Ok(())
                    },
                )
                .column(ColumnSpec::named("OPENED_BY").updatable(false)),
            )
            .field(
                FieldMeta::new(
                    "status",
                    SqlType::enumeration(["OPEN", "FROZEN", "CLOSED"]),
                    |a: &Account| Value::from(a.status.clone()),
                    |a, v| {
                        a.status = v.try_into()?;
                        Ok(())
                    },
                )
                .column(ColumnSpec::new().not_null()),
            )
            .with_default_constructor()
    }
}

pub fn account_row(number: &str, owner: &str, opened_by: &str, status: &str) -> Vec<Value> {
    vec![
        Value::from(number),
        Value::from(owner),
        Value::from(opened_by),
        Value::from(status),
    ]
}

/// No primary key at all
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tag {
    pub label: String,
}

impl Entity for Tag {
    fn metadata() -> EntityMetadata<Self> {
        EntityMetadata::new()
            .table(TableMeta::new("TAG"))
            .field(
                FieldMeta::new(
                    "label",
                    SqlType::Text,
                    |t: &Tag| Value::from(t.label.clone()),
                    |t, v| {
                        t.label = v.try_into()?;
                        Ok(())
                    },
                )
                .column(ColumnSpec::new().not_null()),
            )
            .with_default_constructor()
    }
}

/// MySQL LIKE matching with `%`, `_` and backslash escapes
fn like_matches(pattern: &[char], text: &[char]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some(('%', rest)) => (0..=text.len()).any(|skip| like_matches(rest, &text[skip..])),
        Some(('_', rest)) => !text.is_empty() && like_matches(rest, &text[1..]),
        Some(('\\', rest)) if !rest.is_empty() => {
            text.first() == Some(&rest[0]) && like_matches(&rest[1..], &text[1..])
        }
        Some((c, rest)) => text.first() == Some(c) && like_matches(rest, &text[1..]),
    }
}
