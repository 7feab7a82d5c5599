use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Preflight(#[from] crate::upload::PreflightError),

    #[error(transparent)]
    Quota(#[from] super::quota::QuotaError),

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: Uuid },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Database(#[from] crate::db::DatabaseError),

    #[error(transparent)]
    Storage(#[from] crate::error::StorageError),

    #[error("Failed to queue job: {0}")]
    Dispatch(#[from] crate::error::WorkerError),
}

impl ServiceError {
    pub(crate) fn not_found(kind: &'static str, id: Uuid) -> Self {
        ServiceError::NotFound { kind, id }
    }
}
