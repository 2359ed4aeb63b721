// src/record/entity.rs
//
// Active record: in-memory mirror of one row
//
// INVARIANTS:
// - Unpopulated -> Populated happens once, on populate(); never back
// - A populated record's primary key is write-once
// - Writes on an unpopulated record stay in memory (row being assembled)
// - Writes on a populated record are persisted one column at a time

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use log::warn;

use crate::db::statements::{self, DeltaOp};
use crate::db::SqlExecutor;
use crate::error::{DbError, DbResult};
use crate::rowset::{Row, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    Unpopulated,
    Populated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Persist {
    Background,
    Blocking,
}

pub struct Record {
    table: String,
    primary_key: String,
    columns: Vec<(String, Value)>,
    state: RecordState,
    db: Arc<dyn SqlExecutor>,
}

impl Record {
    pub fn new(
        table: impl Into<String>,
        primary_key: impl Into<String>,
        db: Arc<dyn SqlExecutor>,
    ) -> Self {
        Self {
            table: table.into(),
            primary_key: primary_key.into(),
            columns: Vec::new(),
            state: RecordState::Unpopulated,
            db,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Columns in insertion order: source order after populate, then any
    /// columns set afterwards.
    pub fn columns(&self) -> &[(String, Value)] {
        &self.columns
    }

    pub fn state(&self) -> RecordState {
        self.state
    }

    pub fn exists(&self) -> bool {
        self.state == RecordState::Populated
    }

    /// Replace the in-memory columns with a materialized row and mark the
    /// record Populated.
    pub fn populate(&mut self, row: &Row) {
        self.columns = row
            .iter()
            .map(|(name, cell)| (name.to_string(), cell.value().clone()))
            .collect();
        self.state = RecordState::Populated;
    }

    fn put(&mut self, column: &str, value: Value) {
        match self.columns.iter_mut().find(|(name, _)| name == column) {
            Some((_, slot)) => *slot = value,
            None => self.columns.push((column.to_string(), value)),
        }
    }

    /// Key used to address the stored row. Without it an UPDATE would
    /// match nothing.
    fn primary_key_value(&self) -> DbResult<Value> {
        match self.get(&self.primary_key) {
            Some(value) if !value.is_null() => Ok(value.clone()),
            _ => Err(DbError::MissingColumn(self.primary_key.clone())),
        }
    }

    fn is_locked(&self, column: &str) -> bool {
        self.exists() && column == self.primary_key
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Textual form of the column; `None` when missing or null.
    pub fn get_string(&self, column: &str) -> Option<String> {
        self.get(column)
            .filter(|v| !v.is_null())
            .map(Value::to_string)
    }

    fn parsed<T: FromStr>(&self, column: &str, target: &'static str) -> DbResult<T> {
        let value = self
            .get(column)
            .ok_or_else(|| DbError::MissingColumn(column.to_string()))?;
        let conversion_error = || DbError::Conversion {
            column: column.to_string(),
            found: format!("{} '{}'", value.type_name(), value),
            target,
        };
        if value.is_null() {
            return Err(conversion_error());
        }
        value.to_string().parse().map_err(|_| conversion_error())
    }

    pub fn get_int(&self, column: &str) -> DbResult<i32> {
        self.parsed(column, "i32")
    }

    pub fn get_long(&self, column: &str) -> DbResult<i64> {
        self.parsed(column, "i64")
    }

    pub fn get_double(&self, column: &str) -> DbResult<f64> {
        self.parsed(column, "f64")
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    fn update_statement(&self, column: &str, value: Value, key: Value) -> (String, Vec<Value>) {
        let null = value.is_null();
        let sql = statements::update_column(&self.table, column, &self.primary_key, null);
        let params = if null { vec![key] } else { vec![value, key] };
        (sql, params)
    }

    /// Set a column. Persisted in the background once the record exists.
    pub fn set(&mut self, column: &str, value: impl Into<Value>) {
        if self.is_locked(column) {
            return;
        }
        let value = value.into();
        self.put(column, value.clone());
        if !self.exists() {
            return;
        }
        match self.primary_key_value() {
            Ok(key) => {
                let (sql, params) = self.update_statement(column, value, key);
                self.db.spawn(sql, params);
            }
            Err(e) => warn!("Not persisting {}.{}: {}", self.table, column, e),
        }
    }

    /// Like `set`, but the UPDATE runs before returning. Fails without
    /// touching the in-memory value when the row has no key.
    pub fn set_sync(&mut self, column: &str, value: impl Into<Value>) -> DbResult<()> {
        if self.is_locked(column) {
            return Ok(());
        }
        let value = value.into();
        let key = if self.exists() {
            Some(self.primary_key_value()?)
        } else {
            None
        };
        self.put(column, value.clone());
        if let Some(key) = key {
            let (sql, params) = self.update_statement(column, value, key);
            self.db.run(&sql, &params)?;
        }
        Ok(())
    }

    /// Increment a column server-side. The in-memory value follows by the
    /// same delta and may drift from the server under concurrent writers.
    pub fn add(&mut self, column: &str, delta: i64) -> DbResult<()> {
        self.apply_delta(column, DeltaOp::Add, delta, Persist::Background)
    }

    pub fn sub(&mut self, column: &str, delta: i64) -> DbResult<()> {
        self.apply_delta(column, DeltaOp::Sub, delta, Persist::Background)
    }

    pub fn add_sync(&mut self, column: &str, delta: i64) -> DbResult<()> {
        self.apply_delta(column, DeltaOp::Add, delta, Persist::Blocking)
    }

    pub fn sub_sync(&mut self, column: &str, delta: i64) -> DbResult<()> {
        self.apply_delta(column, DeltaOp::Sub, delta, Persist::Blocking)
    }

    fn apply_delta(&mut self, column: &str, op: DeltaOp, delta: i64, persist: Persist) -> DbResult<()> {
        // Only rows that exist, and never the key
        if !self.exists() || column == self.primary_key {
            return Ok(());
        }

        let key = self.primary_key_value()?;
        let current = self
            .get(column)
            .ok_or_else(|| DbError::MissingColumn(column.to_string()))?;
        let updated = offset(column, current, op, delta)?;
        self.put(column, updated);

        let sql = statements::update_delta(&self.table, column, op, delta, &self.primary_key);
        let params = vec![key];
        match persist {
            Persist::Background => self.db.spawn(sql, params),
            Persist::Blocking => {
                self.db.run(&sql, &params)?;
            }
        }
        Ok(())
    }
}

/// Apply a delta to an in-memory value, keeping its type where it fits.
fn offset(column: &str, current: &Value, op: DeltaOp, delta: i64) -> DbResult<Value> {
    let conversion_error = || DbError::Conversion {
        column: column.to_string(),
        found: format!("{} '{}'", current.type_name(), current),
        target: "i64",
    };
    let shift = |v: i64| match op {
        DeltaOp::Add => v.checked_add(delta),
        DeltaOp::Sub => v.checked_sub(delta),
    };

    match current {
        Value::Integer(v) => {
            let r = shift(i64::from(*v)).ok_or_else(conversion_error)?;
            Ok(i32::try_from(r).map_or(Value::Long(r), Value::Integer))
        }
        Value::Long(v) => shift(*v).map(Value::Long).ok_or_else(conversion_error),
        Value::Double(v) => Ok(Value::Double(match op {
            DeltaOp::Add => v + delta as f64,
            DeltaOp::Sub => v - delta as f64,
        })),
        Value::Text(s) => {
            let parsed = i64::from_str(s.trim()).map_err(|_| conversion_error())?;
            shift(parsed).map(Value::Long).ok_or_else(conversion_error)
        }
        _ => Err(conversion_error()),
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("table", &self.table)
            .field("primary_key", &self.primary_key)
            .field("state", &self.state)
            .field("columns", &self.columns)
            .finish()
    }
}
