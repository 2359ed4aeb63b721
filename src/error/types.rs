// src/error/types.rs
use rusqlite::ffi;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Database error: {0}")]
    Database(#[source] rusqlite::Error),

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Pool error: {0}")]
    Pool(String),

    #[error("Connection pool is not connected")]
    NotConnected,

    #[error("Connection pool is closed")]
    Closed,

    #[error("Column not found: {0}")]
    MissingColumn(String),

    #[error("Cannot convert column {column} ({found}) to {target}")]
    Conversion {
        column: String,
        found: String,
        target: &'static str,
    },

    #[error("Unknown database: {0}")]
    UnknownDatabase(String),

    #[error("Scheduler is shut down")]
    SchedulerShutdown,

    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DbError {
    /// True for unique / primary-key constraint violations.
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, DbError::DuplicateKey(_))
    }

    /// True when the failure happened before a connection was handed out.
    pub fn is_acquire_failure(&self) -> bool {
        matches!(
            self,
            DbError::Pool(_) | DbError::NotConnected | DbError::Closed
        )
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                || e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
        }
        _ => false,
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(err: rusqlite::Error) -> Self {
        if is_unique_violation(&err) {
            DbError::DuplicateKey(err.to_string())
        } else {
            DbError::Database(err)
        }
    }
}

impl From<r2d2::Error> for DbError {
    fn from(err: r2d2::Error) -> Self {
        DbError::Pool(err.to_string())
    }
}

pub type DbResult<T> = Result<T, DbError>;
