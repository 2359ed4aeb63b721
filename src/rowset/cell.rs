// src/rowset/cell.rs
//
// Typed column values
//
// A Value is fixed at materialization time from the column's declared SQL
// type; it never changes shape afterwards.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};

const TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// A dynamically-typed SQL value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    /// 32-bit signed integer
    Integer(i32),
    /// 64-bit signed integer
    Long(i64),
    Double(f64),
    Text(String),
    Bytes(Vec<u8>),
    /// Timestamp, UTC wall-clock
    Timestamp(NaiveDateTime),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Integer(_) => "INTEGER",
            Value::Long(_) => "BIGINT",
            Value::Double(_) => "DOUBLE",
            Value::Text(_) => "TEXT",
            Value::Bytes(_) => "BLOB",
            Value::Timestamp(_) => "TIMESTAMP",
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(i64::from(*v)),
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Build a value from a raw SQLite cell.
    ///
    /// `decl_type` is the column's declared type (`None` for expressions);
    /// it decides between Integer/Long and whether text is a timestamp.
    pub fn from_sqlite(raw: ValueRef<'_>, decl_type: Option<&str>) -> Value {
        let decl = decl_type.map(str::to_ascii_uppercase);
        let decl = decl.as_deref().unwrap_or("");
        match raw {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => {
                if decl.contains("BIGINT") {
                    Value::Long(i)
                } else {
                    i32::try_from(i).map_or(Value::Long(i), Value::Integer)
                }
            }
            ValueRef::Real(f) => Value::Double(f),
            ValueRef::Text(bytes) => {
                let text = String::from_utf8_lossy(bytes).into_owned();
                if is_temporal(decl) {
                    parse_timestamp(&text).map_or(Value::Text(text), Value::Timestamp)
                } else {
                    Value::Text(text)
                }
            }
            ValueRef::Blob(bytes) => Value::Bytes(bytes.to_vec()),
        }
    }
}

fn is_temporal(decl: &str) -> bool {
    decl.contains("DATE") || decl.contains("TIME")
}

/// Parse the textual timestamp forms SQLite produces.
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Whether a declared SQL type is a signed numeric type.
///
/// Expression columns carry no declared type; for those the storage class
/// of the value decides.
pub fn is_signed_type(decl_type: Option<&str>, raw: ValueRef<'_>) -> bool {
    match decl_type {
        Some(decl) => {
            let decl = decl.to_ascii_uppercase();
            if decl.contains("UNSIGNED") {
                return false;
            }
            ["INT", "REAL", "FLOA", "DOUB", "NUM", "DEC"]
                .iter()
                .any(|t| decl.contains(t))
        }
        None => matches!(raw, ValueRef::Integer(_) | ValueRef::Real(_)),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Long(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Text(s) => write!(f, "{}", s),
            Value::Bytes(b) => write!(f, "{}", String::from_utf8_lossy(b)),
            Value::Timestamp(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S%.f")),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        use rusqlite::types::Value as Sql;

        Ok(match self {
            Value::Null => ToSqlOutput::Owned(Sql::Null),
            Value::Integer(v) => ToSqlOutput::Owned(Sql::Integer(i64::from(*v))),
            Value::Long(v) => ToSqlOutput::Owned(Sql::Integer(*v)),
            Value::Double(v) => ToSqlOutput::Owned(Sql::Real(*v)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Bytes(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
            Value::Timestamp(ts) => {
                ToSqlOutput::Owned(Sql::Text(ts.format("%Y-%m-%d %H:%M:%S%.f").to_string()))
            }
        })
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Long(i64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Integer(i32::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// One materialized column value plus the signedness of its source type.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    value: Value,
    signed: bool,
}

impl Cell {
    pub fn new(value: Value, signed: bool) -> Self {
        Self { value, signed }
    }

    pub fn from_sqlite(raw: ValueRef<'_>, decl_type: Option<&str>) -> Self {
        Self {
            signed: is_signed_type(decl_type, raw),
            value: Value::from_sqlite(raw, decl_type),
        }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    pub fn is_signed(&self) -> bool {
        self.signed
    }

    pub fn is_null(&self) -> bool {
        self.value.is_null()
    }
}
