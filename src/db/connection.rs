// src/db/connection.rs
//
// Pooled connections to one database
//
// PRINCIPLES:
// - One physical connection per logical operation
// - The connection returns to the pool on every exit path
// - Reads are fully materialized before the connection is released
// - Async variants run the same sequence on the scheduler's task pool

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use log::{debug, error, info};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params_from_iter, Rows};

use super::config::DatabaseConfig;
use super::executor::SqlExecutor;
use crate::error::{DbError, DbResult};
use crate::rowset::{source_table, ColumnSpec, RowSet, Value};
use crate::scheduler::Scheduler;

/// Type alias for the underlying r2d2 pool
pub type SqlitePool = Pool<SqliteConnectionManager>;

/// Type alias for a pooled connection
pub type PooledConn = PooledConnection<SqliteConnectionManager>;

/// One-shot delivery of a background result. A reply dropped before it is
/// sent (task rejected or abandoned at shutdown) reports `SchedulerShutdown`.
struct Reply<T> {
    callback: Option<Box<dyn FnOnce(DbResult<T>) + Send + 'static>>,
}

impl<T> Reply<T> {
    fn new<F>(callback: F) -> Self
    where
        F: FnOnce(DbResult<T>) + Send + 'static,
    {
        Self {
            callback: Some(Box::new(callback)),
        }
    }

    fn send(mut self, result: DbResult<T>) {
        if let Some(callback) = self.callback.take() {
            callback(result);
        }
    }
}

impl<T> Drop for Reply<T> {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            callback(Err(DbError::SchedulerShutdown));
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    Uninitialized,
    Connected,
    Closed,
}

enum Slot {
    Uninitialized,
    Connected(SqlitePool),
    Closed,
}

pub struct ConnectionPool {
    config: DatabaseConfig,
    scheduler: Arc<Scheduler>,
    slot: RwLock<Slot>,
}

/// Build the r2d2 pool
///
/// Every physical connection gets:
/// - the configured prepared-statement cache
/// - a busy timeout instead of immediate SQLITE_BUSY errors
/// - UTF-8, foreign keys, WAL journaling
fn build_pool(config: &DatabaseConfig) -> DbResult<SqlitePool> {
    let settings = &config.pool;
    settings.validate()?;

    let cache_capacity = settings.statement_cache_capacity;
    let busy_timeout = Duration::from_millis(settings.busy_timeout_ms);

    let manager = SqliteConnectionManager::file(&config.path).with_init(move |conn| {
        conn.set_prepared_statement_cache_capacity(cache_capacity);
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch(
            "PRAGMA encoding = 'UTF-8';
             PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )
    });

    Pool::builder()
        .max_size(settings.max_size)
        .min_idle(Some(settings.min_idle))
        .connection_timeout(Duration::from_millis(settings.connection_timeout_ms))
        .idle_timeout(Some(Duration::from_millis(settings.idle_timeout_ms)))
        .max_lifetime(Some(Duration::from_millis(settings.max_lifetime_ms)))
        .build(manager)
        .map_err(|e| DbError::Pool(format!("Failed to create connection pool: {}", e)))
}

/// Acquire, prepare, bind, run `f` on the live cursor, release.
fn with_cursor<R>(
    pool: &SqlitePool,
    sql: &str,
    params: &[Value],
    f: impl FnOnce(&[ColumnSpec], &mut Rows<'_>) -> DbResult<R>,
) -> DbResult<R> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare_cached(sql)?;
    let columns = ColumnSpec::describe(&stmt);
    let mut rows = stmt.query(params_from_iter(params))?;
    f(&columns, &mut rows)
}

fn materialize_on(pool: &SqlitePool, sql: &str, params: &[Value]) -> DbResult<RowSet> {
    with_cursor(pool, sql, params, |columns, rows| {
        RowSet::materialize(columns, rows, source_table(sql))
    })
}

fn execute_on(pool: &SqlitePool, sql: &str, params: &[Value]) -> DbResult<usize> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare_cached(sql)?;
    Ok(stmt.execute(params_from_iter(params))?)
}

fn log_failure(err: &DbError, sql: &str) {
    if err.is_acquire_failure() {
        error!("Error when getting pool connection: {}", err);
    } else {
        error!("SQL error: {} [{}]", err, sql);
    }
}

impl ConnectionPool {
    /// Create an unconnected pool. Call `connect` before use.
    pub fn new(config: DatabaseConfig, scheduler: Arc<Scheduler>) -> Self {
        Self {
            config,
            scheduler,
            slot: RwLock::new(Slot::Uninitialized),
        }
    }

    /// `new` followed by `connect`.
    pub fn open(config: DatabaseConfig, scheduler: Arc<Scheduler>) -> DbResult<Self> {
        let pool = Self::new(config, scheduler);
        pool.connect()?;
        Ok(pool)
    }

    /// Build the pool and probe one connection.
    ///
    /// Failure here is fatal for setup and returned as-is. A closed pool
    /// cannot be reconnected.
    pub fn connect(&self) -> DbResult<()> {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        match *slot {
            Slot::Connected(_) => return Ok(()),
            Slot::Closed => return Err(DbError::Closed),
            Slot::Uninitialized => {}
        }

        let pool = build_pool(&self.config)?;
        // A bad path or unusable file fails here rather than on first use
        drop(pool.get()?);

        *slot = Slot::Connected(pool);
        info!(
            "Connected to database {} ({})",
            self.config.name,
            self.config.path.display()
        );
        Ok(())
    }

    /// Stop handing out connections. Operations already holding one finish.
    pub fn close(&self) {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        if matches!(*slot, Slot::Connected(_)) {
            info!("Closing database {}", self.config.name);
        }
        *slot = Slot::Closed;
    }

    pub fn state(&self) -> PoolState {
        match *self.slot.read().unwrap_or_else(PoisonError::into_inner) {
            Slot::Uninitialized => PoolState::Uninitialized,
            Slot::Connected(_) => PoolState::Connected,
            Slot::Closed => PoolState::Closed,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state() == PoolState::Connected
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    fn handle(&self) -> DbResult<SqlitePool> {
        match &*self.slot.read().unwrap_or_else(PoisonError::into_inner) {
            Slot::Connected(pool) => Ok(pool.clone()),
            Slot::Uninitialized => Err(DbError::NotConnected),
            Slot::Closed => Err(DbError::Closed),
        }
    }

    /// Borrow a raw connection, e.g. for schema setup.
    pub fn get_connection(&self) -> DbResult<PooledConn> {
        Ok(self.handle()?.get()?)
    }

    // ------------------------------------------------------------------
    // Synchronous
    // ------------------------------------------------------------------

    pub fn try_query(&self, sql: &str, params: &[Value]) -> DbResult<RowSet> {
        debug!("query: {}", sql);
        materialize_on(&self.handle()?, sql, params)
    }

    /// Query and materialize. `None` on failure; the failure is logged.
    pub fn query(&self, sql: &str, params: &[Value]) -> Option<RowSet> {
        self.try_query(sql, params)
            .map_err(|e| log_failure(&e, sql))
            .ok()
    }

    /// Run `f` against the live cursor while the connection is still held.
    pub fn query_with<R, F>(&self, sql: &str, params: &[Value], f: F) -> Option<R>
    where
        F: FnOnce(&mut Rows<'_>) -> rusqlite::Result<R>,
    {
        debug!("query: {}", sql);
        self.handle()
            .and_then(|pool| with_cursor(&pool, sql, params, |_, rows| Ok(f(rows)?)))
            .map_err(|e| log_failure(&e, sql))
            .ok()
    }

    pub fn try_execute(&self, sql: &str, params: &[Value]) -> DbResult<usize> {
        debug!("execute: {}", sql);
        execute_on(&self.handle()?, sql, params)
    }

    /// Execute a statement. Errors are logged, not returned.
    pub fn execute(&self, sql: &str, params: &[Value]) {
        if let Err(e) = self.try_execute(sql, params) {
            log_failure(&e, sql);
        }
    }

    // ------------------------------------------------------------------
    // Fire-and-forget
    // ------------------------------------------------------------------

    /// Query on the task pool; `callback` receives the outcome on the
    /// worker thread. After scheduler shutdown it receives
    /// `SchedulerShutdown` instead.
    pub fn async_query<F>(&self, sql: impl Into<String>, params: Vec<Value>, callback: F)
    where
        F: FnOnce(DbResult<RowSet>) + Send + 'static,
    {
        let sql = sql.into();
        let pool = self.handle();
        let reply = Reply::new(callback);
        let submitted = self.scheduler.run_task(move || {
            debug!("async query: {}", sql);
            let result = pool.and_then(|pool| materialize_on(&pool, &sql, &params));
            if let Err(e) = &result {
                log_failure(e, &sql);
            }
            reply.send(result);
        });
        if let Err(e) = submitted {
            error!("Cannot schedule background query: {}", e);
        }
    }

    pub fn async_execute(&self, sql: impl Into<String>, params: Vec<Value>) {
        self.spawn_execute(sql.into(), params, None);
    }

    /// Execute on the task pool; `callback` receives the affected row count
    /// or the failure, `SchedulerShutdown` included.
    pub fn async_execute_callback<F>(&self, sql: impl Into<String>, params: Vec<Value>, callback: F)
    where
        F: FnOnce(DbResult<usize>) + Send + 'static,
    {
        self.spawn_execute(sql.into(), params, Some(Reply::new(callback)));
    }

    fn spawn_execute(&self, sql: String, params: Vec<Value>, reply: Option<Reply<usize>>) {
        let pool = self.handle();
        let submitted = self.scheduler.run_task(move || {
            debug!("async execute: {}", sql);
            let result = pool.and_then(|pool| execute_on(&pool, &sql, &params));
            match &result {
                // Concurrent inserts of the same key are an expected race
                Err(e) if e.is_duplicate_key() => {}
                Err(e) => log_failure(e, &sql),
                Ok(_) => {}
            }
            if let Some(reply) = reply {
                reply.send(result);
            }
        });
        if let Err(e) = submitted {
            error!("Cannot schedule background statement: {}", e);
        }
    }
}

impl SqlExecutor for ConnectionPool {
    fn fetch(&self, sql: &str, params: &[Value]) -> DbResult<RowSet> {
        self.try_query(sql, params)
    }

    fn run(&self, sql: &str, params: &[Value]) -> DbResult<usize> {
        self.try_execute(sql, params)
    }

    fn spawn(&self, sql: String, params: Vec<Value>) {
        self.async_execute(sql, params);
    }
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("name", &self.config.name)
            .field("path", &self.config.path)
            .field("state", &self.state())
            .finish()
    }
}
