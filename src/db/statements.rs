// src/db/statements.rs
//
// SQL text for record persistence. Values are always bound as
// parameters; only identifiers and integer deltas appear inline.

/// Direction of a server-side arithmetic update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaOp {
    Add,
    Sub,
}

impl DeltaOp {
    fn symbol(self) -> char {
        match self {
            DeltaOp::Add => '+',
            DeltaOp::Sub => '-',
        }
    }
}

/// Column identifier as written into statements. Table names are left bare.
pub fn quote(column: &str) -> String {
    format!("`{}`", column.replace('`', "``"))
}

pub fn select_by_key(table: &str, primary_key: &str) -> String {
    format!("SELECT * FROM {} WHERE {} = ?", table, quote(primary_key))
}

/// `filter` is appended verbatim (`WHERE ...`, `ORDER BY ...`, ...).
pub fn select_where(table: &str, filter: &str) -> String {
    let filter = filter.trim();
    if filter.is_empty() {
        format!("SELECT * FROM {}", table)
    } else {
        format!("SELECT * FROM {} {}", table, filter)
    }
}

/// Single-column update. Null values are written as a literal `NULL` so
/// only the key is bound.
pub fn update_column(table: &str, column: &str, primary_key: &str, null: bool) -> String {
    let value = if null { "NULL" } else { "?" };
    format!(
        "UPDATE {} SET {} = {} WHERE {} = ?",
        table,
        quote(column),
        value,
        quote(primary_key)
    )
}

/// `column = column ± delta`, evaluated by the server.
pub fn update_delta(table: &str, column: &str, op: DeltaOp, delta: i64, primary_key: &str) -> String {
    let column = quote(column);
    format!(
        "UPDATE {} SET {} = {} {} {} WHERE {} = ?",
        table,
        column,
        column,
        op.symbol(),
        delta,
        quote(primary_key)
    )
}

pub fn insert(table: &str, columns: &[&str]) -> String {
    if columns.is_empty() {
        return format!("INSERT INTO {} DEFAULT VALUES", table);
    }
    let names = columns
        .iter()
        .map(|c| quote(c))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = vec!["?"; columns.len()].join(", ");
    format!("INSERT INTO {} ({}) VALUES ({})", table, names, placeholders)
}

pub fn delete_where(table: &str, filter: &str) -> String {
    let filter = filter.trim();
    if filter.is_empty() {
        format!("DELETE FROM {}", table)
    } else {
        format!("DELETE FROM {} {}", table, filter)
    }
}
