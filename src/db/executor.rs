// src/db/executor.rs
//
// Statement execution seam used by records and repositories.
// ConnectionPool is the production implementation.

use crate::error::DbResult;
use crate::rowset::{RowSet, Value};

#[cfg_attr(test, mockall::automock)]
pub trait SqlExecutor: Send + Sync {
    /// Run a query and return its materialized result.
    fn fetch(&self, sql: &str, params: &[Value]) -> DbResult<RowSet>;

    /// Run a statement synchronously; returns the affected row count.
    fn run(&self, sql: &str, params: &[Value]) -> DbResult<usize>;

    /// Run a statement in the background. Failures are logged, except
    /// duplicate-key races which are dropped silently.
    fn spawn(&self, sql: String, params: Vec<Value>);
}
