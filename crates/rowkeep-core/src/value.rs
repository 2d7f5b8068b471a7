//! Values and the value conversion service
//!
//! [`Value`] is the in-memory form of a column value; `Clone` is a deep copy,
//! which is what baseline snapshots rely on. [`ValueConverter`] maps between
//! semantic field types and the store: DDL type text, reading result columns,
//! binding parameters and enum definitions.

use crate::errors::{MappingError, Result, RkError, RkErrorKind};
use crate::model::FieldDescriptor;
use crate::resource::{Row, Statement};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Semantic type of a mapped field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlType {
    Bool,
    Int,
    BigInt,
    Float,
    Double,
    Text,
    LongText,
    Bytes,
    Timestamp,
    /// Enumeration with its declared values, in declaration order
    Enum(Vec<String>),
}

impl SqlType {
    /// Enum type from any list of value names
    pub fn enumeration<I, S>(values: I) -> SqlType
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SqlType::Enum(values.into_iter().map(Into::into).collect())
    }
}

/// A column value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(DateTime<Utc>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => "BOOL",
            Value::Int(_) => "INT",
            Value::Double(_) => "DOUBLE",
            Value::Text(_) => "TEXT",
            Value::Bytes(_) => "BYTES",
            Value::Timestamp(_) => "TIMESTAMP",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Equality used for dirty checking
    ///
    /// Doubles compare by bit pattern with every NaN collapsed to one, so NaN
    /// matches NaN and `0.0` differs from `-0.0`.
    pub fn same_as(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Double(a), Value::Double(b)) => {
                (a.is_nan() && b.is_nan()) || a.to_bits() == b.to_bits()
            }
            (a, b) => a == b,
        }
    }

    /// Convert a nullable value, mapping `Null` to `None`
    pub fn into_option<T>(self) -> Result<Option<T>>
    where
        T: TryFrom<Value, Error = RkError>,
    {
        match self {
            Value::Null => Ok(None),
            other => T::try_from(other).map(Some),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Double(d) => write!(f, "{}", d),
            Value::Text(s) => write!(f, "'{}'", s),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
        }
    }
}

fn mismatch(expected: &str, found: &Value) -> RkError {
    MappingError::TypeMismatch {
        expected: expected.to_string(),
        found: found.type_name().to_string(),
    }
    .into()
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl TryFrom<Value> for bool {
    type Error = RkError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Bool(b) => Ok(b),
            Value::Int(i) => Ok(i != 0),
            other => Err(mismatch("bool", &other)),
        }
    }
}

impl TryFrom<Value> for i64 {
    type Error = RkError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Int(i) => Ok(i),
            Value::Bool(b) => Ok(i64::from(b)),
            other => Err(mismatch("i64", &other)),
        }
    }
}

impl TryFrom<Value> for i32 {
    type Error = RkError;

    fn try_from(value: Value) -> Result<Self> {
        let wide = i64::try_from(value)?;
        i32::try_from(wide).map_err(|_| {
            RkError::from(MappingError::TypeMismatch {
                expected: "i32".to_string(),
                found: format!("INT {}", wide),
            })
        })
    }
}

impl TryFrom<Value> for u32 {
    type Error = RkError;

    fn try_from(value: Value) -> Result<Self> {
        let wide = i64::try_from(value)?;
        u32::try_from(wide).map_err(|_| {
            RkError::from(MappingError::TypeMismatch {
                expected: "u32".to_string(),
                found: format!("INT {}", wide),
            })
        })
    }
}

impl TryFrom<Value> for f64 {
    type Error = RkError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Double(d) => Ok(d),
            Value::Int(i) => Ok(i as f64),
            other => Err(mismatch("f64", &other)),
        }
    }
}

impl TryFrom<Value> for String {
    type Error = RkError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Text(s) => Ok(s),
            other => Err(mismatch("String", &other)),
        }
    }
}

impl TryFrom<Value> for Vec<u8> {
    type Error = RkError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Bytes(b) => Ok(b),
            Value::Text(s) => Ok(s.into_bytes()),
            other => Err(mismatch("bytes", &other)),
        }
    }
}

impl TryFrom<Value> for DateTime<Utc> {
    type Error = RkError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Timestamp(ts) => Ok(ts),
            other => Err(mismatch("timestamp", &other)),
        }
    }
}

/// Render `ENUM('v1','v2',...)` in declaration order
pub fn enum_definition(values: &[String]) -> String {
    let literals: Vec<String> = values
        .iter()
        .map(|v| format!("'{}'", v.replace('\'', "''")))
        .collect();
    format!("ENUM({})", literals.join(","))
}

/// Parse the literal list of a live enum column type such as `enum('A','B')`
///
/// Returns `Ok(None)` when the type is not an enum.
pub fn parse_enum_definition(column: &str, column_type: &str) -> Result<Option<Vec<String>>> {
    let trimmed = column_type.trim();
    let Some(head) = trimmed.get(..5) else {
        return Ok(None);
    };
    if !head.eq_ignore_ascii_case("enum(") {
        return Ok(None);
    }
    let reflection_error = || -> RkError {
        MappingError::EnumReflection {
            column: column.to_string(),
            definition: column_type.to_string(),
        }
        .into()
    };
    let body = trimmed[5..]
        .strip_suffix(')')
        .ok_or_else(reflection_error)?;

    let mut values = Vec::new();
    let mut chars = body.chars().peekable();
    loop {
        match chars.next() {
            None => break,
            Some('\'') => {}
            Some(_) => return Err(reflection_error()),
        }
        let mut literal = String::new();
        loop {
            match chars.next() {
                Some('\'') if chars.peek() == Some(&'\'') => {
                    chars.next();
                    literal.push('\'');
                }
                Some('\'') => break,
                Some(c) => literal.push(c),
                None => return Err(reflection_error()),
            }
        }
        values.push(literal);
        match chars.next() {
            None => break,
            Some(',') => {
                while chars.peek() == Some(&' ') {
                    chars.next();
                }
            }
            Some(_) => return Err(reflection_error()),
        }
    }
    Ok(Some(values))
}

/// Value conversion service
///
/// Bidirectional mapping between stored column representations and the
/// in-memory values of mapped fields.
pub trait ValueConverter: Send + Sync {
    /// DDL type text for a semantic type
    fn storage_type(&self, sql_type: &SqlType) -> Result<String>;

    /// Coerce a raw store value into the representation of `field`
    fn coerce(&self, value: Value, field: &FieldDescriptor) -> Result<Value>;

    /// Read the column at a 0-based `ordinal` of `row` for `field`
    fn read_column(&self, row: &Row, field: &FieldDescriptor, ordinal: usize) -> Result<Value> {
        let raw = row.get(ordinal).cloned().ok_or_else(|| {
            RkError::new(RkErrorKind::Storage).with_message(format!(
                "Row has no column at ordinal {} for field {}",
                ordinal,
                field.name()
            ))
        })?;
        self.coerce(raw, field)
    }

    /// Bind `value` as the parameter at 1-based `index`
    fn write_parameter(
        &self,
        value: &Value,
        statement: &mut dyn Statement,
        index: usize,
    ) -> Result<()> {
        statement.bind(index, value)
    }

    /// Copy a value for a baseline snapshot
    fn deep_copy(&self, value: &Value) -> Value {
        value.clone()
    }

    /// Literal list of a live enum column type, `None` when not an enum
    fn live_enum_values(&self, column: &str, column_type: &str) -> Result<Option<Vec<String>>> {
        parse_enum_definition(column, column_type)
    }
}

/// Default converter for the MySQL/MariaDB dialect
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlConverter;

impl MySqlConverter {
    fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
        if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
            return Some(ts.with_timezone(&Utc));
        }
        ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
            .map(|naive| Utc.from_utc_datetime(&naive))
    }
}

impl ValueConverter for MySqlConverter {
    fn storage_type(&self, sql_type: &SqlType) -> Result<String> {
        let text = match sql_type {
            SqlType::Bool => "TINYINT(1)",
            SqlType::Int => "INT",
            SqlType::BigInt => "BIGINT",
            SqlType::Float => "FLOAT",
            SqlType::Double => "DOUBLE",
            SqlType::Text => "VARCHAR(255)",
            SqlType::LongText => "TEXT",
            SqlType::Bytes => "BLOB",
            SqlType::Timestamp => "DATETIME",
            SqlType::Enum(values) => return Ok(enum_definition(values)),
        };
        Ok(text.to_string())
    }

    fn coerce(&self, value: Value, field: &FieldDescriptor) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        match field.sql_type() {
            SqlType::Bool => bool::try_from(value).map(Value::Bool),
            SqlType::Int | SqlType::BigInt => i64::try_from(value).map(Value::Int),
            SqlType::Float | SqlType::Double => f64::try_from(value).map(Value::Double),
            SqlType::Text | SqlType::LongText => match value {
                Value::Bytes(bytes) => String::from_utf8(bytes)
                    .map(Value::Text)
                    .map_err(|e| mismatch("utf-8 text", &Value::Bytes(e.into_bytes()))),
                Value::Text(s) => Ok(Value::Text(s)),
                other => Err(mismatch("text", &other)),
            },
            SqlType::Bytes => Vec::<u8>::try_from(value).map(Value::Bytes),
            SqlType::Timestamp => match value {
                Value::Timestamp(ts) => Ok(Value::Timestamp(ts)),
                Value::Text(text) => Self::parse_timestamp(&text)
                    .map(Value::Timestamp)
                    .ok_or_else(|| mismatch("timestamp", &Value::Text(text))),
                Value::Int(secs) => Utc
                    .timestamp_opt(secs, 0)
                    .single()
                    .map(Value::Timestamp)
                    .ok_or_else(|| mismatch("timestamp", &Value::Int(secs))),
                other => Err(mismatch("timestamp", &other)),
            },
            SqlType::Enum(values) => match value {
                Value::Text(name) if values.contains(&name) => Ok(Value::Text(name)),
                Value::Text(name) => Err(MappingError::TypeMismatch {
                    expected: format!("one of {}", values.join("|")),
                    found: name,
                }
                .into()),
                other => Err(mismatch("enum text", &other)),
            },
        }
    }

    fn write_parameter(
        &self,
        value: &Value,
        statement: &mut dyn Statement,
        index: usize,
    ) -> Result<()> {
        // TINYINT(1) carries booleans
        match value {
            Value::Bool(b) => statement.bind(index, &Value::Int(i64::from(*b))),
            other => statement.bind(index, other),
        }
    }
}
