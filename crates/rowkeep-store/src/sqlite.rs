//! SQLite resource adapter
//!
//! Implements the rowkeep-core resource seams over rusqlite. Each `open()`
//! yields a fresh connection to the configured database file; dropping the
//! boxed connection closes it.
//!
//! Dialect differences handled here:
//! - table existence and column introspection go through `sqlite_master`
//!   and `PRAGMA table_info`
//! - `TRUNCATE TABLE t` runs as `DELETE FROM t`
//! - generated keys come from `last_insert_rowid()`
//! - auto-commit is toggled with explicit `BEGIN`/`COMMIT`/`ROLLBACK`

use crate::config::StoreConfig;
use crate::db;
use crate::errors::{config_error, from_rusqlite, Result};
use rowkeep_core::errors::RkError;
use rowkeep_core::{
    Connection, ConnectionFactory, FieldDescriptor, KeyRetrieval, LiveColumn, MySqlConverter,
    Row, SqlType, Statement, Value, ValueConverter,
};
use rusqlite::types::Value as SqlValue;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Opens SQLite connections to one database file
#[derive(Debug, Clone)]
pub struct SqliteConnectionFactory {
    path: PathBuf,
    config: StoreConfig,
}

impl SqliteConnectionFactory {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            config: StoreConfig::default(),
        }
    }

    /// Factory for the database named by `config.path`
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        let path = config
            .path
            .clone()
            .ok_or_else(|| config_error("Store configuration has no database path"))?;
        Ok(Self {
            path,
            config: config.clone(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a connection with the concrete SQLite type
    pub fn connect(&self) -> Result<SqliteConnection> {
        let conn = db::open(&self.path)?;
        db::configure(&conn, &self.config)?;
        tracing::debug!(op = "open", path = %self.path.display(), "sqlite connection opened");
        Ok(SqliteConnection { conn })
    }

    pub fn into_shared(self) -> Arc<dyn ConnectionFactory> {
        Arc::new(self)
    }
}

impl ConnectionFactory for SqliteConnectionFactory {
    fn open(&self) -> Result<Box<dyn Connection>> {
        Ok(Box::new(self.connect()?))
    }
}

/// An open SQLite connection
pub struct SqliteConnection {
    conn: rusqlite::Connection,
}

impl SqliteConnection {
    pub fn from_raw(conn: rusqlite::Connection) -> Self {
        Self { conn }
    }

    /// Underlying rusqlite connection
    pub fn raw(&self) -> &rusqlite::Connection {
        &self.conn
    }

    fn batch(&self, op: &str, sql: &str) -> Result<()> {
        tracing::debug!(op, sql, "executing batch");
        self.conn
            .execute_batch(sql)
            .map_err(|e| from_rusqlite(op, sql, e))
    }
}

impl Connection for SqliteConnection {
    fn prepare(&mut self, sql: &str, keys: KeyRetrieval) -> Result<Box<dyn Statement + '_>> {
        let stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| from_rusqlite("prepare", sql, e))?;
        Ok(Box::new(SqliteStatement {
            conn: &self.conn,
            stmt,
            sql: sql.to_string(),
            keys,
            generated: None,
        }))
    }

    fn set_auto_commit(&mut self, enabled: bool) -> Result<()> {
        match (enabled, self.conn.is_autocommit()) {
            (false, true) => self.batch("begin", "BEGIN"),
            (true, false) => self.batch("commit", "COMMIT"),
            _ => Ok(()),
        }
    }

    fn commit(&mut self) -> Result<()> {
        if self.conn.is_autocommit() {
            return Ok(());
        }
        self.batch("commit", "COMMIT")
    }

    fn rollback(&mut self) -> Result<()> {
        if self.conn.is_autocommit() {
            return Ok(());
        }
        self.batch("rollback", "ROLLBACK")
    }

    fn execute(&mut self, sql: &str) -> Result<u64> {
        let rewritten;
        let sql = match sql.strip_prefix("TRUNCATE TABLE ") {
            Some(table) => {
                rewritten = format!("DELETE FROM {}", table);
                rewritten.as_str()
            }
            None => sql,
        };
        let affected = self
            .conn
            .execute(sql, [])
            .map_err(|e| from_rusqlite("execute", sql, e))?;
        Ok(affected as u64)
    }

    fn table_exists(&mut self, table: &str) -> Result<bool> {
        const SQL: &str = "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1";
        let count: i64 = self
            .conn
            .query_row(SQL, [table], |row| row.get(0))
            .map_err(|e| from_rusqlite("table_exists", SQL, e))?;
        Ok(count > 0)
    }

    fn describe_columns(&mut self, table: &str) -> Result<Vec<LiveColumn>> {
        let sql = format!("PRAGMA table_info({})", table);
        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|e| from_rusqlite("describe_columns", &sql, e))?;
        let columns = stmt
            .query_map([], |row| {
                Ok(LiveColumn {
                    name: row.get("name")?,
                    column_type: row.get("type")?,
                })
            })
            .map_err(|e| from_rusqlite("describe_columns", &sql, e))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| from_rusqlite("describe_columns", &sql, e))?;
        Ok(columns)
    }
}

struct SqliteStatement<'c> {
    conn: &'c rusqlite::Connection,
    stmt: rusqlite::Statement<'c>,
    sql: String,
    keys: KeyRetrieval,
    generated: Option<i64>,
}

impl SqliteStatement<'_> {
    fn error(&self, op: &str, err: rusqlite::Error) -> RkError {
        from_rusqlite(op, &self.sql, err)
    }
}

impl Statement for SqliteStatement<'_> {
    fn sql(&self) -> &str {
        &self.sql
    }

    fn bind(&mut self, index: usize, value: &Value) -> Result<()> {
        let bound = to_sqlite(value);
        self.stmt
            .raw_bind_parameter(index, bound)
            .map_err(|e| self.error("bind", e))
    }

    fn execute_update(&mut self) -> Result<u64> {
        let affected = self
            .stmt
            .raw_execute()
            .map_err(|e| from_rusqlite("execute_update", &self.sql, e))?;
        if self.keys == KeyRetrieval::Generated && affected > 0 {
            self.generated = Some(self.conn.last_insert_rowid());
        }
        Ok(affected as u64)
    }

    fn execute_query(&mut self) -> Result<Vec<Row>> {
        let columns: Arc<[String]> = self
            .stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        let width = columns.len();

        let mut result = Vec::new();
        let mut rows = self.stmt.raw_query();
        loop {
            let row = match rows.next() {
                Ok(Some(row)) => row,
                Ok(None) => break,
                Err(e) => return Err(from_rusqlite("execute_query", &self.sql, e)),
            };
            let values = (0..width)
                .map(|i| row.get::<_, SqlValue>(i).map(from_sqlite))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| from_rusqlite("execute_query", &self.sql, e))?;
            result.push(Row::new(columns.clone(), values));
        }
        Ok(result)
    }

    fn generated_key(&mut self) -> Result<Option<Value>> {
        Ok(self.generated.map(Value::Int))
    }
}

fn to_sqlite(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Int(i) => SqlValue::Integer(*i),
        Value::Double(d) => SqlValue::Real(*d),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Bytes(b) => SqlValue::Blob(b.clone()),
        Value::Timestamp(ts) => SqlValue::Text(ts.to_rfc3339()),
    }
}

fn from_sqlite(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) => Value::Int(i),
        SqlValue::Real(d) => Value::Double(d),
        SqlValue::Text(s) => Value::Text(s),
        SqlValue::Blob(b) => Value::Bytes(b),
    }
}

/// Value converter for SQLite's type affinities
///
/// Integer columns are declared `INTEGER` so a single integer primary key
/// aliases the rowid and is generated on insert. Enum columns are stored as
/// `TEXT`; their values are still checked on load.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteConverter;

impl ValueConverter for SqliteConverter {
    fn storage_type(&self, sql_type: &SqlType) -> Result<String> {
        match sql_type {
            SqlType::Bool | SqlType::Int | SqlType::BigInt => Ok("INTEGER".to_string()),
            SqlType::Float | SqlType::Double => Ok("REAL".to_string()),
            SqlType::Enum(_) => Ok("TEXT".to_string()),
            other => MySqlConverter.storage_type(other),
        }
    }

    fn coerce(&self, value: Value, field: &FieldDescriptor) -> Result<Value> {
        MySqlConverter.coerce(value, field)
    }

    fn live_enum_values(&self, _column: &str, _column_type: &str) -> Result<Option<Vec<String>>> {
        Ok(None)
    }
}
