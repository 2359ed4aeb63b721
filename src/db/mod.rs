// src/db/mod.rs
//
// Database module
//
// Provides:
// - Configuration (pool tuning, named databases)
// - Connection pooling with sync and fire-and-forget execution
// - The executor seam used by records
// - Registry of named pools
// - SQL text builders for record persistence

pub mod config;
pub mod connection;
pub mod executor;
pub mod registry;
pub mod statements;

pub use config::{DatabaseConfig, PoolSettings};
pub use connection::{ConnectionPool, PoolState, PooledConn, SqlitePool};
pub use executor::SqlExecutor;
pub use registry::DatabaseRegistry;

#[cfg(test)]
pub use executor::MockSqlExecutor;
