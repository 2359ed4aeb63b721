// src/rowset/row.rs

use std::collections::HashMap;
use std::sync::Arc;

use super::cell::{Cell, Value};

/// Column names shared by every row of one result.
#[derive(Debug, Clone, Default)]
pub struct ColumnInfo {
    names: Vec<String>,
    name_to_index: HashMap<String, usize>,
}

impl ColumnInfo {
    /// A name repeated in the source (e.g. a join) resolves to its last
    /// occurrence.
    pub fn new(names: Vec<String>) -> Self {
        let name_to_index = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self {
            names,
            name_to_index,
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    pub fn name_at(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// One materialized row: cells in source column order.
#[derive(Debug, Clone)]
pub struct Row {
    cells: Vec<Cell>,
    columns: Arc<ColumnInfo>,
}

impl Row {
    pub fn new(columns: Arc<ColumnInfo>, cells: Vec<Cell>) -> Self {
        debug_assert_eq!(columns.len(), cells.len());
        Self { cells, columns }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn columns(&self) -> &ColumnInfo {
        &self.columns
    }

    pub fn get(&self, name: &str) -> Option<&Cell> {
        self.columns
            .index_of(name)
            .and_then(|i| self.cells.get(i))
    }

    pub fn get_value(&self, name: &str) -> Option<&Value> {
        self.get(name).map(Cell::value)
    }

    /// `(name, cell)` pairs in source column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Cell)> {
        self.columns
            .names()
            .iter()
            .map(String::as_str)
            .zip(self.cells.iter())
    }

    pub fn to_values(&self) -> HashMap<String, Value> {
        self.iter()
            .map(|(name, cell)| (name.to_string(), cell.value().clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_name_and_order() {
        let info = Arc::new(ColumnInfo::new(vec!["id".into(), "name".into()]));
        let row = Row::new(
            info,
            vec![
                Cell::new(Value::Integer(1), true),
                Cell::new(Value::Text("Ann".into()), false),
            ],
        );

        assert_eq!(row.get_value("name"), Some(&Value::Text("Ann".into())));
        assert!(row.get("missing").is_none());

        let names: Vec<&str> = row.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["id", "name"]);
    }

    #[test]
    fn test_duplicate_names_resolve_to_last() {
        let info = ColumnInfo::new(vec!["id".into(), "id".into()]);
        assert_eq!(info.index_of("id"), Some(1));
        assert_eq!(info.len(), 2);
    }
}
