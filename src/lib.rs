// src/lib.rs
// PoolDB - Pooled SQL access with materialized results and active records
//
// Architecture:
// - Pooled: one physical connection per logical operation, always released
// - Materialized: query results are snapshotted before the connection returns
// - Injected: pools are passed to repositories, never looked up globally
// - Explicit: background writes report through callbacks or logs, never panics

pub mod db;
pub mod error;
pub mod record;
pub mod repositories;
pub mod rowset;
pub mod scheduler;

// ============================================================================
// PUBLIC API
// ============================================================================

pub use db::{
    ConnectionPool, DatabaseConfig, DatabaseRegistry, PoolSettings, PoolState, SqlExecutor,
};
pub use error::{DbError, DbResult};
pub use record::{Model, Record, RecordState};
pub use repositories::RecordRepository;
pub use rowset::{Cell, CursorPosition, Row, RowSet, RowSetMetadata, Value};
pub use scheduler::{Scheduler, TaskHandle};
