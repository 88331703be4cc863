//! Error types shared across the engine.

use crate::models::EntityKind;

/// How the server (or the path to it) answered a push or fetch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// Timeout, unreachable host, 5xx. Retried on the next poll tick.
    #[error("network error: {0}")]
    Network(String),
    /// The server refused the record. Not retried automatically.
    #[error("rejected by server: {0}")]
    Rejected(String),
    /// The server holds a newer version of the record.
    #[error("conflicting change on server: {0}")]
    Conflict(String),
}

impl RemoteError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, RemoteError::Network(_))
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Errors from the local record store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt row in {table}: {reason}")]
    Corrupt { table: &'static str, reason: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by the list manager.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("the attached user is not allowed to {0} shopping lists")]
    PermissionDenied(&'static str),

    #[error("missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("the record was removed before the server confirmed it")]
    Superseded,
}

impl ManagerError {
    pub(crate) fn not_found(kind: EntityKind, id: impl ToString) -> Self {
        ManagerError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

pub type ManagerResult<T> = Result<T, ManagerError>;
