//! Error types for fleet-store.

use std::path::PathBuf;

use rusqlite::ErrorCode;
use thiserror::Error;

use fleet_core::TransitionError;

/// All errors that can arise from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite failure, including lock timeouts (`SQLITE_BUSY`).
    #[error("sqlite error: {0}")]
    Sql(#[from] rusqlite::Error),

    /// JSON encoding of a spec body or membership column.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A row addressed by id or key does not exist.
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// A reconciler state change the state machine rejects.
    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl StoreError {
    pub(crate) fn not_found(entity: &'static str, key: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    /// The database lock could not be acquired within the busy timeout.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            StoreError::Sql(rusqlite::Error::SqliteFailure(err, _))
                if matches!(err.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
        )
    }
}

/// Convenience constructor for [`StoreError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}
