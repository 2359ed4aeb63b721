// src/record/model.rs
//
// Binding between a user type and its table
//
// A model owns one Record and names the table and key it maps to.
// Repositories build models through an explicit factory closure.

use std::sync::Arc;

use super::entity::Record;
use crate::db::SqlExecutor;
use crate::rowset::Row;

pub trait Model: Send + 'static {
    const TABLE: &'static str;
    const PRIMARY_KEY: &'static str;

    fn record(&self) -> &Record;

    fn record_mut(&mut self) -> &mut Record;

    /// Called after every populate. Derive cached fields here.
    fn on_populated(&mut self) {}

    fn populate(&mut self, row: &Row) {
        self.record_mut().populate(row);
        self.on_populated();
    }

    fn exists(&self) -> bool {
        self.record().exists()
    }

    /// Fresh unpopulated record bound to this model's table.
    fn blank_record(db: Arc<dyn SqlExecutor>) -> Record
    where
        Self: Sized,
    {
        Record::new(Self::TABLE, Self::PRIMARY_KEY, db)
    }
}
