//! Database error types.

use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

use crate::job::TransitionError;

/// Errors from database operations.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// SQLite error from rusqlite.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error when creating directories or files.
    #[error("IO error for path '{}': {source}", crate::sanitize::redact_path(.path))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A JSON column could not be encoded.
    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),

    /// A migration failed to apply.
    #[error("Migration failed at version {version}: {reason}")]
    Migration { version: u32, reason: String },

    /// The stored status did not allow the requested transition.
    #[error("{0}")]
    Transition(#[from] TransitionError),

    /// No job with this id exists for the tenant.
    #[error("Job {0} not found")]
    JobNotFound(Uuid),

    /// The database lock was poisoned.
    #[error("Database lock poisoned")]
    LockPoisoned,
}
