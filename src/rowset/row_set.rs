// src/rowset/row_set.rs
//
// Materialized query results
//
// PRINCIPLES:
// - The source cursor is drained completely while the connection is held
// - Content never changes after construction; only the cursor moves
// - Accessors never fail: bad position, missing column or null cell
//   degrade to None / -1 / empty bytes

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use chrono::NaiveDateTime;
use log::warn;
use regex::Regex;
use rusqlite::{Rows, Statement};

use super::cell::{parse_timestamp, Cell, Value};
use super::row::{ColumnInfo, Row};
use crate::error::DbResult;

/// Name and declared type of one result column, captured before the
/// statement starts stepping.
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub name: String,
    pub decl_type: Option<String>,
}

impl ColumnSpec {
    pub fn describe(stmt: &Statement<'_>) -> Vec<ColumnSpec> {
        stmt.columns()
            .iter()
            .map(|c| ColumnSpec {
                name: c.name().to_string(),
                decl_type: c.decl_type().map(str::to_string),
            })
            .collect()
    }
}

/// Best-effort source table of a statement: the first `FROM` target.
pub fn source_table(sql: &str) -> Option<String> {
    static FROM: OnceLock<Option<Regex>> = OnceLock::new();
    FROM.get_or_init(|| Regex::new(r#"(?i)\bFROM\s+[`"\[]?([A-Za-z_][A-Za-z0-9_]*)"#).ok())
        .as_ref()
        .and_then(|re| re.captures(sql))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Cursor position inside a RowSet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorPosition {
    /// The snapshot has no rows; navigation always fails.
    Empty,
    BeforeFirst,
    At(usize),
    AfterLast,
}

#[derive(Debug, Clone)]
pub struct RowSetMetadata {
    table_name: Option<String>,
    columns: Arc<ColumnInfo>,
}

impl RowSetMetadata {
    pub fn new(table_name: Option<String>, columns: Arc<ColumnInfo>) -> Self {
        Self {
            table_name,
            columns,
        }
    }

    pub fn table_name(&self) -> Option<&str> {
        self.table_name.as_deref()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Zero-based column name lookup.
    pub fn column_name(&self, index: usize) -> Option<&str> {
        self.columns.name_at(index)
    }

    pub fn column_names(&self) -> &[String] {
        self.columns.names()
    }
}

#[derive(Debug, Clone)]
pub struct RowSet {
    rows: Vec<Row>,
    cursor: CursorPosition,
    metadata: RowSetMetadata,
}

impl RowSet {
    pub fn new(metadata: RowSetMetadata, rows: Vec<Row>) -> Self {
        let cursor = if rows.is_empty() {
            CursorPosition::Empty
        } else {
            CursorPosition::BeforeFirst
        };
        Self {
            rows,
            cursor,
            metadata,
        }
    }

    pub fn empty() -> Self {
        Self::new(RowSetMetadata::new(None, Arc::default()), Vec::new())
    }

    /// Drain a live cursor into a snapshot.
    pub fn materialize(
        columns: &[ColumnSpec],
        rows: &mut Rows<'_>,
        table_name: Option<String>,
    ) -> DbResult<RowSet> {
        let info = Arc::new(ColumnInfo::new(
            columns.iter().map(|c| c.name.clone()).collect(),
        ));
        let mut snapshot = Vec::new();

        while let Some(row) = rows.next()? {
            let mut cells = Vec::with_capacity(columns.len());
            for (i, spec) in columns.iter().enumerate() {
                cells.push(Cell::from_sqlite(row.get_ref(i)?, spec.decl_type.as_deref()));
            }
            snapshot.push(Row::new(Arc::clone(&info), cells));
        }

        Ok(RowSet::new(RowSetMetadata::new(table_name, info), snapshot))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn metadata(&self) -> &RowSetMetadata {
        &self.metadata
    }

    /// All rows, independent of the cursor.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    pub fn first(&mut self) -> bool {
        if self.cursor == CursorPosition::Empty {
            return false;
        }
        self.cursor = CursorPosition::At(0);
        true
    }

    pub fn last(&mut self) -> bool {
        if self.cursor == CursorPosition::Empty {
            return false;
        }
        self.cursor = CursorPosition::At(self.rows.len() - 1);
        true
    }

    pub fn before_first(&mut self) -> bool {
        if self.cursor == CursorPosition::Empty {
            return false;
        }
        self.cursor = CursorPosition::BeforeFirst;
        true
    }

    /// Advance one row. Returns false once past the last row and keeps
    /// returning false until the cursor is repositioned.
    pub fn next(&mut self) -> bool {
        let next = match self.cursor {
            CursorPosition::Empty => return false,
            CursorPosition::AfterLast => return false,
            CursorPosition::BeforeFirst => 0,
            CursorPosition::At(i) => i + 1,
        };
        if next < self.rows.len() {
            self.cursor = CursorPosition::At(next);
            true
        } else {
            self.cursor = CursorPosition::AfterLast;
            false
        }
    }

    pub fn position(&self) -> CursorPosition {
        self.cursor
    }

    /// One-based number of the current row.
    pub fn row(&self) -> Option<usize> {
        match self.cursor {
            CursorPosition::At(i) => Some(i + 1),
            _ => None,
        }
    }

    pub fn current_row(&self) -> Option<&Row> {
        match self.cursor {
            CursorPosition::At(i) => self.rows.get(i),
            _ => None,
        }
    }

    pub fn current_values(&self) -> Option<HashMap<String, Value>> {
        self.current_row().map(Row::to_values)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn get_object(&self, column: &str) -> Option<&Cell> {
        self.current_row().and_then(|row| row.get(column))
    }

    fn non_null(&self, column: &str) -> Option<&Value> {
        self.get_object(column)
            .map(Cell::value)
            .filter(|v| !v.is_null())
    }

    fn parse_or<T: FromStr>(&self, column: &str, fallback: T) -> T {
        let Some(value) = self.non_null(column) else {
            return fallback;
        };
        let text = value.to_string();
        match text.parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                warn!(
                    "Cannot convert column {} value {:?} to {}",
                    column,
                    text,
                    std::any::type_name::<T>()
                );
                fallback
            }
        }
    }

    pub fn get_string(&self, column: &str) -> Option<String> {
        self.non_null(column).map(Value::to_string)
    }

    pub fn get_int(&self, column: &str) -> i32 {
        self.parse_or(column, -1)
    }

    pub fn get_long(&self, column: &str) -> i64 {
        self.parse_or(column, -1)
    }

    pub fn get_double(&self, column: &str) -> f64 {
        self.parse_or(column, -1.0)
    }

    pub fn get_byte(&self, column: &str) -> i8 {
        self.parse_or(column, -1)
    }

    pub fn get_bytes(&self, column: &str) -> Vec<u8> {
        match self.non_null(column) {
            Some(Value::Bytes(b)) => b.clone(),
            Some(Value::Text(s)) => s.as_bytes().to_vec(),
            _ => Vec::new(),
        }
    }

    pub fn get_timestamp(&self, column: &str) -> Option<NaiveDateTime> {
        match self.non_null(column)? {
            Value::Timestamp(ts) => Some(*ts),
            Value::Text(s) => parse_timestamp(s),
            other => {
                warn!("Column {} holds {}, not a timestamp", column, other.type_name());
                None
            }
        }
    }

    pub fn is_signed(&self, column: &str) -> bool {
        self.get_object(column).is_some_and(Cell::is_signed)
    }
}
