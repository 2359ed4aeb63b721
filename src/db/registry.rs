// src/db/registry.rs
//
// Named pools
//
// Lookup only: there is no process-wide "active" database. `select`
// returns the pool handle, which callers inject into repositories.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use log::info;

use super::config::DatabaseConfig;
use super::connection::ConnectionPool;
use crate::error::{DbError, DbResult};
use crate::scheduler::Scheduler;

#[derive(Default)]
pub struct DatabaseRegistry {
    pools: RwLock<HashMap<String, Arc<ConnectionPool>>>,
}

impl DatabaseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open and register one pool per configuration entry.
    pub fn connect_all(configs: Vec<DatabaseConfig>, scheduler: Arc<Scheduler>) -> DbResult<Self> {
        let registry = Self::new();
        for config in configs {
            let name = config.name.clone();
            let pool = ConnectionPool::open(config, Arc::clone(&scheduler))?;
            registry.register(name, Arc::new(pool));
        }
        Ok(registry)
    }

    /// Register `pool` under `name`, replacing any previous entry.
    pub fn register(&self, name: impl Into<String>, pool: Arc<ConnectionPool>) {
        let name = name.into();
        info!("Registered database {}", name);
        self.pools
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, pool);
    }

    pub fn select(&self, name: &str) -> DbResult<Arc<ConnectionPool>> {
        self.pools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| DbError::UnknownDatabase(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .pools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn close_all(&self) {
        for pool in self
            .pools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
        {
            pool.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::PoolState;
    use tempfile::TempDir;

    #[test]
    fn test_select_unknown_name_fails() {
        let registry = DatabaseRegistry::new();
        match registry.select("main") {
            Err(DbError::UnknownDatabase(name)) => assert_eq!(name, "main"),
            other => panic!("unexpected: {:?}", other.map(|p| p.name().to_string())),
        }
    }

    #[test]
    fn test_connect_all_and_select() {
        let dir = TempDir::new().unwrap();
        let scheduler = Arc::new(Scheduler::new().unwrap());
        let configs = vec![
            DatabaseConfig::new("main", dir.path().join("main.db")),
            DatabaseConfig::new("audit", dir.path().join("audit.db")),
        ];

        let registry = DatabaseRegistry::connect_all(configs, scheduler).unwrap();
        assert_eq!(registry.names(), vec!["audit".to_string(), "main".to_string()]);

        let main = registry.select("main").unwrap();
        assert_eq!(main.name(), "main");
        assert!(main.is_connected());

        registry.close_all();
        assert_eq!(main.state(), PoolState::Closed);
    }
}
