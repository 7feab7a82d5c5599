use std::path::PathBuf;

use thiserror::Error;

use archiparse::client::ApiError;
use archiparse::db::DatabaseError;
use archiparse::logging::LoggingError;
use archiparse::watch::WatchError;
use archiparse::{ConfigError, SecretError, ServiceError, WorkerError};

#[derive(Error, Debug)]
pub(crate) enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Secret(#[from] SecretError),

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error(transparent)]
    Worker(#[from] WorkerError),

    #[error(transparent)]
    Logging(#[from] LoggingError),

    #[error("Failed to read '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No database path configured and no home directory found")]
    NoDatabasePath,

    #[error("Failed to print output: {0}")]
    Output(#[from] serde_json::Error),

    #[error("Job {0} failed")]
    JobFailed(uuid::Uuid),
}
