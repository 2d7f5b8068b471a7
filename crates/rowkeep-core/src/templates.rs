//! Memoized canonical statement text
//!
//! Each descriptor owns one [`SqlTemplates`] cache. Statements are rendered on
//! first use and reused for the descriptor's lifetime; the cache is safe to
//! share across threads.

use crate::errors::Result;
use crate::model::EntitySchema;
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

/// Per-descriptor statement cache
#[derive(Debug, Default)]
pub struct SqlTemplates {
    insert: OnceLock<String>,
    select_by_key: OnceLock<String>,
    delete_by_key: OnceLock<String>,
    select_by_field: Mutex<HashMap<String, String>>,
}

impl EntitySchema {
    /// `INSERT INTO <t> (<insertable columns>) VALUES (?, ...)`
    pub fn insert_sql(&self) -> &str {
        self.templates().insert.get_or_init(|| {
            let columns: Vec<&str> = self
                .fields()
                .iter()
                .filter(|f| f.is_insertable())
                .map(|f| f.name())
                .collect();
            let placeholders = vec!["?"; columns.len()];
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                self.table().name(),
                columns.join(", "),
                placeholders.join(", ")
            )
        })
    }

    /// `SELECT <all columns> FROM <t> WHERE <pk>=?`
    ///
    /// # Errors
    ///
    /// Cardinality error unless the table has exactly one primary key.
    pub fn select_by_key_sql(&self) -> Result<&str> {
        let key = self.single_primary_key()?;
        Ok(self
            .templates()
            .select_by_key
            .get_or_init(|| self.render_select(self.fields()[key].name())))
    }

    /// `SELECT <all columns> FROM <t> WHERE <column>=?`
    ///
    /// # Errors
    ///
    /// Configuration error when no field is mapped to `column`.
    pub fn select_by_field_sql(&self, column: &str) -> Result<String> {
        let mut cache = self
            .templates()
            .select_by_field
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(sql) = cache.get(column) {
            return Ok(sql.clone());
        }
        self.field_index(column)?;
        let sql = self.render_select(column);
        cache.insert(column.to_string(), sql.clone());
        Ok(sql)
    }

    /// `DELETE FROM <t> WHERE <pk>=?`
    ///
    /// # Errors
    ///
    /// Cardinality error unless the table has exactly one primary key.
    pub fn delete_by_key_sql(&self) -> Result<&str> {
        let key = self.single_primary_key()?;
        Ok(self.templates().delete_by_key.get_or_init(|| {
            format!(
                "DELETE FROM {} WHERE {}=?",
                self.table().name(),
                self.fields()[key].name()
            )
        }))
    }

    fn render_select(&self, predicate_column: &str) -> String {
        let columns: Vec<&str> = self.fields().iter().map(|f| f.name()).collect();
        format!(
            "SELECT {} FROM {} WHERE {}=?",
            columns.join(", "),
            self.table().name(),
            predicate_column
        )
    }
}
