//! Resource abstraction
//!
//! The store is reached exclusively through these traits. A connection is
//! acquired from a [`ConnectionFactory`] and released when the boxed handle is
//! dropped, so every exit path (normal return or `?`) gives it back.
//!
//! Bind indices are 1-based, row ordinals are 0-based.

use crate::errors::{storage_error, Result};
use crate::value::Value;
use std::sync::Arc;

/// Whether a prepared statement should retrieve a store-generated key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRetrieval {
    None,
    Generated,
}

/// A column as reported by live-store introspection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveColumn {
    pub name: String,
    /// Type text exactly as the store reports it, e.g. `enum('A','B')`
    pub column_type: String,
}

/// One materialized result row
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// Value at a 0-based ordinal
    pub fn get(&self, ordinal: usize) -> Option<&Value> {
        self.values.get(ordinal)
    }

    /// Value of a column by name (case-insensitive)
    pub fn get_named(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .and_then(|i| self.values.get(i))
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

/// A prepared statement
pub trait Statement {
    /// SQL text this statement was prepared from
    fn sql(&self) -> &str;

    /// Bind a parameter at a 1-based index
    fn bind(&mut self, index: usize, value: &Value) -> Result<()>;

    /// Execute a data-modifying statement, returning the affected row count
    fn execute_update(&mut self) -> Result<u64>;

    /// Execute a query and materialize every row
    fn execute_query(&mut self) -> Result<Vec<Row>>;

    /// Key generated by the last `execute_update`, when retrieval was requested
    fn generated_key(&mut self) -> Result<Option<Value>>;
}

/// An open store connection
pub trait Connection {
    fn prepare(&mut self, sql: &str, keys: KeyRetrieval) -> Result<Box<dyn Statement + '_>>;

    fn set_auto_commit(&mut self, enabled: bool) -> Result<()>;

    fn commit(&mut self) -> Result<()>;

    fn rollback(&mut self) -> Result<()>;

    /// Execute a parameterless statement
    fn execute(&mut self, sql: &str) -> Result<u64> {
        let mut statement = self.prepare(sql, KeyRetrieval::None)?;
        statement.execute_update()
    }

    /// Check whether a table exists (MySQL: `SHOW TABLES LIKE ?`)
    fn table_exists(&mut self, table: &str) -> Result<bool> {
        let mut statement = self.prepare("SHOW TABLES LIKE ?", KeyRetrieval::None)?;
        statement.bind(1, &Value::Text(like_literal(table)))?;
        Ok(!statement.execute_query()?.is_empty())
    }

    /// Introspect live columns in table order (MySQL: `SHOW COLUMNS FROM <t>`)
    fn describe_columns(&mut self, table: &str) -> Result<Vec<LiveColumn>> {
        let sql = format!("SHOW COLUMNS FROM {}", table);
        let rows = {
            let mut statement = self.prepare(&sql, KeyRetrieval::None)?;
            statement.execute_query()?
        };
        rows.iter()
            .map(|row| {
                let name = row.get_named("Field").or_else(|| row.get(0));
                let column_type = row.get_named("Type").or_else(|| row.get(1));
                match (name, column_type) {
                    (Some(Value::Text(name)), Some(Value::Text(column_type))) => Ok(LiveColumn {
                        name: name.clone(),
                        column_type: column_type.clone(),
                    }),
                    _ => Err(storage_error(
                        "describe_columns",
                        &sql,
                        "unexpected SHOW COLUMNS row layout",
                    )),
                }
            })
            .collect()
    }
}

/// Escape `text` so a LIKE pattern matches it literally
pub fn like_literal(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '_' | '%') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Source of store connections
pub trait ConnectionFactory: Send + Sync {
    fn open(&self) -> Result<Box<dyn Connection>>;
}

/// A connection with auto-commit disabled
///
/// Obtained from `Session::begin`. `commit`/`rollback` restore auto-commit and
/// release the connection; dropping an unfinished transaction rolls it back.
pub struct Transaction {
    conn: Box<dyn Connection>,
    finished: bool,
}

impl Transaction {
    /// Disable auto-commit on `conn` and wrap it
    pub fn begin(mut conn: Box<dyn Connection>) -> Result<Self> {
        conn.set_auto_commit(false)?;
        Ok(Self {
            conn,
            finished: false,
        })
    }

    /// Connection to pass to the session's `*_in` operations
    pub fn connection(&mut self) -> &mut dyn Connection {
        self.conn.as_mut()
    }

    /// A failed commit leaves the transaction unfinished, so drop rolls it back
    pub fn commit(mut self) -> Result<()> {
        self.conn.commit()?;
        self.finished = true;
        self.conn.set_auto_commit(true)
    }

    pub fn rollback(mut self) -> Result<()> {
        self.finished = true;
        self.conn.rollback()?;
        self.conn.set_auto_commit(true)
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(err) = self.conn.rollback() {
            tracing::warn!(error = %err, "rollback of abandoned transaction failed");
        }
        if let Err(err) = self.conn.set_auto_commit(true) {
            tracing::warn!(error = %err, "restoring auto-commit failed");
        }
    }
}
