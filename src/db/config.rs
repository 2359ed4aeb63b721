// src/db/config.rs
//
// Database and pool configuration
//
// Defaults keep no idle connections and recycle connections well before
// typical server-side idle cutoffs.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DbError, DbResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    pub max_size: u32,
    pub min_idle: u32,
    pub connection_timeout_ms: u64,
    pub idle_timeout_ms: u64,
    pub max_lifetime_ms: u64,
    /// Prepared statements cached per connection
    pub statement_cache_capacity: usize,
    pub busy_timeout_ms: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_size: 15,
            min_idle: 0,
            connection_timeout_ms: 30_000,
            idle_timeout_ms: 35_000,
            max_lifetime_ms: 45_000,
            statement_cache_capacity: 250,
            busy_timeout_ms: 5_000,
        }
    }
}

impl PoolSettings {
    pub fn max_size(mut self, n: u32) -> Self {
        self.max_size = n;
        self
    }

    pub fn min_idle(mut self, n: u32) -> Self {
        self.min_idle = n;
        self
    }

    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout_ms = duration_ms(timeout);
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout_ms = duration_ms(timeout);
        self
    }

    pub fn max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime_ms = duration_ms(lifetime);
        self
    }

    /// Reject values the pool builder would panic on.
    pub fn validate(&self) -> DbResult<()> {
        if self.max_size == 0 {
            return Err(DbError::Config("max_size must be greater than zero".into()));
        }
        if self.min_idle > self.max_size {
            return Err(DbError::Config(format!(
                "min_idle ({}) cannot exceed max_size ({})",
                self.min_idle, self.max_size
            )));
        }
        for (name, value) in [
            ("connection_timeout_ms", self.connection_timeout_ms),
            ("idle_timeout_ms", self.idle_timeout_ms),
            ("max_lifetime_ms", self.max_lifetime_ms),
        ] {
            if value == 0 {
                return Err(DbError::Config(format!("{} must be greater than zero", name)));
            }
        }
        Ok(())
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// One named database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub name: String,
    pub path: PathBuf,
    #[serde(default)]
    pub pool: PoolSettings,
}

impl DatabaseConfig {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            pool: PoolSettings::default(),
        }
    }

    pub fn with_pool(mut self, pool: PoolSettings) -> Self {
        self.pool = pool;
        self
    }

    pub fn from_json_str(json: &str) -> DbResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.pool.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> DbResult<Self> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    /// A JSON array of database entries.
    pub fn list_from_json_str(json: &str) -> DbResult<Vec<Self>> {
        let configs: Vec<Self> = serde_json::from_str(json)?;
        for config in &configs {
            config.pool.validate()?;
        }
        Ok(configs)
    }
}
