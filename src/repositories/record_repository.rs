// src/repositories/record_repository.rs
//
// Generic CRUD/upsert over one Model kind
//
// CRITICAL RULES:
// - Stateless beyond the executor and the factory
// - Reads are synchronous: callers see the populated model on return
// - Upserts are not atomic; a duplicate-key insert means another writer
//   won the race and the re-fetch is canonical

use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::db::statements;
use crate::db::SqlExecutor;
use crate::error::DbResult;
use crate::record::{Model, Record};
use crate::rowset::Value;

type Factory<M> = Arc<dyn Fn(Record) -> M + Send + Sync>;

pub struct RecordRepository<M: Model> {
    db: Arc<dyn SqlExecutor>,
    factory: Factory<M>,
}

impl<M: Model> Clone for RecordRepository<M> {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
            factory: Arc::clone(&self.factory),
        }
    }
}

impl<M: Model> RecordRepository<M> {
    pub fn new<F>(db: Arc<dyn SqlExecutor>, factory: F) -> Self
    where
        F: Fn(Record) -> M + Send + Sync + 'static,
    {
        Self {
            db,
            factory: Arc::new(factory),
        }
    }

    /// Fresh, unpopulated model.
    pub fn create(&self) -> M {
        (self.factory)(M::blank_record(Arc::clone(&self.db)))
    }

    pub fn get(&self, pk: impl Into<Value>) -> DbResult<M> {
        let mut model = self.create();
        self.get_into(&mut model, pk)?;
        Ok(model)
    }

    /// Populate `target` from the row keyed by `pk`. On no match the target
    /// is left as it was.
    pub fn get_into(&self, target: &mut M, pk: impl Into<Value>) -> DbResult<()> {
        let sql = statements::select_by_key(M::TABLE, M::PRIMARY_KEY);
        let rows = self.db.fetch(&sql, &[pk.into()])?;
        if let Some(row) = rows.rows().first() {
            target.populate(row);
        }
        Ok(())
    }

    /// `SELECT * FROM <table> <filter>`, one populated model per row.
    pub fn find(&self, filter: &str, params: &[Value]) -> DbResult<Vec<M>> {
        let sql = statements::select_where(M::TABLE, filter);
        let rows = self.db.fetch(&sql, params)?;
        Ok(rows
            .rows()
            .iter()
            .map(|row| {
                let mut model = self.create();
                model.populate(row);
                model
            })
            .collect())
    }

    pub fn find_first(&self, filter: &str, params: &[Value]) -> DbResult<Option<M>> {
        let sql = statements::select_where(M::TABLE, filter);
        let rows = self.db.fetch(&sql, params)?;
        Ok(rows.rows().first().map(|row| {
            let mut model = self.create();
            model.populate(row);
            model
        }))
    }

    pub fn all(&self) -> DbResult<Vec<M>> {
        self.find("", &[])
    }

    pub fn get_or_insert(&self, pk: impl Into<Value>) -> DbResult<M> {
        self.get_or_insert_with(&[], pk)
    }

    pub fn get_or_insert_with(&self, defaults: &[(&str, Value)], pk: impl Into<Value>) -> DbResult<M> {
        let mut model = self.create();
        self.get_or_insert_into(&mut model, defaults, pk)?;
        Ok(model)
    }

    /// Fetch by key; on miss insert the key plus `defaults` and fetch again
    /// so server-side defaults are picked up.
    pub fn get_or_insert_into(
        &self,
        target: &mut M,
        defaults: &[(&str, Value)],
        pk: impl Into<Value>,
    ) -> DbResult<()> {
        let pk = pk.into();
        self.get_into(target, pk.clone())?;
        if target.exists() {
            return Ok(());
        }

        apply_defaults(target.record_mut(), defaults);
        target.record_mut().set(M::PRIMARY_KEY, pk.clone());
        self.insert_tolerant(target)?;
        self.get_into(target, pk)
    }

    /// Filter-keyed upsert: at most one insert, then one re-select.
    /// `None` when the defaults do not satisfy the filter.
    pub fn get_or_insert_where(
        &self,
        defaults: &[(&str, Value)],
        filter: &str,
        params: &[Value],
    ) -> DbResult<Option<M>> {
        if let Some(found) = self.find_first(filter, params)? {
            return Ok(Some(found));
        }

        let mut fresh = self.create();
        apply_defaults(fresh.record_mut(), defaults);
        self.insert_tolerant(&fresh)?;

        let found = self.find_first(filter, params)?;
        if found.is_none() {
            warn!("Row inserted into {} is not matched by '{}'", M::TABLE, filter);
        }
        Ok(found)
    }

    /// INSERT built from the model's in-memory columns. The key goes first
    /// and only when assigned; every other column is written, nulls included.
    pub fn insert(&self, model: &M) -> DbResult<usize> {
        let record = model.record();
        let mut columns: Vec<&str> = Vec::new();
        let mut params: Vec<Value> = Vec::new();

        if let Some(pk) = record.get(M::PRIMARY_KEY).filter(|v| !v.is_null()) {
            columns.push(M::PRIMARY_KEY);
            params.push(pk.clone());
        }
        for (name, value) in record.columns() {
            if name == M::PRIMARY_KEY {
                continue;
            }
            columns.push(name);
            params.push(value.clone());
        }

        let sql = statements::insert(M::TABLE, &columns);
        info!("{}", sql);
        self.db.run(&sql, &params)
    }

    fn insert_tolerant(&self, model: &M) -> DbResult<()> {
        match self.insert(model) {
            Ok(_) => Ok(()),
            Err(e) if e.is_duplicate_key() => {
                debug!("Concurrent insert into {}: {}", M::TABLE, e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// `DELETE FROM <table> <filter>`. Failures are logged and dropped.
    pub fn delete(&self, filter: &str, params: &[Value]) {
        let sql = statements::delete_where(M::TABLE, filter);
        info!("{}", sql);
        if let Err(e) = self.db.run(&sql, params) {
            error!("Delete from {} failed: {}", M::TABLE, e);
        }
    }
}

fn apply_defaults(record: &mut Record, defaults: &[(&str, Value)]) {
    for (column, value) in defaults {
        record.set(column, value.clone());
    }
}
