// src/rowset/mod.rs
//
// Materialized results
//
// Provides:
// - Value / Cell: closed set of column value types
// - Row: one snapshotted row
// - RowSet: navigable snapshot of a whole query result

pub mod cell;
pub mod row;
pub mod row_set;

pub use cell::{Cell, Value};
pub use row::{ColumnInfo, Row};
pub use row_set::{source_table, ColumnSpec, CursorPosition, RowSet, RowSetMetadata};
