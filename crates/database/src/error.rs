//! Database error types.

use thiserror::Error;

/// Errors that can occur during database operations.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// SQLx error (query, decode, constraint other than uniqueness)
    #[error("database error: {0}")]
    Sqlx(sqlx::Error),

    /// The store has been shut down (pool closed).
    #[error("database unavailable: {0}")]
    Unavailable(String),

    /// The store is momentarily unreachable (acquire timeout, I/O, lock
    /// contention). Worth another attempt.
    #[error("database busy: {0}")]
    Busy(String),

    /// Migration error
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Record not found
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Record already exists
    #[error("{entity} already exists: {id}")]
    AlreadyExists { entity: &'static str, id: String },

    /// The record's current state does not allow the change.
    #[error("{entity} {id}: {reason}")]
    InvalidState {
        entity: &'static str,
        id: String,
        reason: String,
    },
}

impl DatabaseError {
    /// Whether the store itself is unreachable, as opposed to the request
    /// being rejected.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, DatabaseError::Unavailable(_) | DatabaseError::Busy(_))
    }

    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, DatabaseError::Busy(_))
    }
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolClosed => DatabaseError::Unavailable(err.to_string()),
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => DatabaseError::Busy(err.to_string()),
            // SQLITE_BUSY / SQLITE_LOCKED
            sqlx::Error::Database(ref db_err)
                if matches!(db_err.code().as_deref(), Some("5") | Some("6")) =>
            {
                DatabaseError::Busy(err.to_string())
            }
            other => DatabaseError::Sqlx(other),
        }
    }
}

/// Map an insert error, turning uniqueness violations into `AlreadyExists`.
pub(crate) fn map_insert_error(err: sqlx::Error, entity: &'static str, id: &str) -> DatabaseError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.is_unique_violation() {
            return DatabaseError::AlreadyExists {
                entity,
                id: id.to_string(),
            };
        }
    }
    DatabaseError::from(err)
}

/// Result type for database operations.
pub type Result<T> = std::result::Result<T, DatabaseError>;
