//! Multi-tenant IFCXML processing: upload pre-flight, a job lifecycle state
//! machine, a validate/parse/transform pipeline run by a worker pool, and a
//! REST client with polling watchers.

pub mod broadcast;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod job;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod sanitize;
pub mod secrets;
pub mod service;
pub mod storage;
pub mod upload;
pub mod watch;
pub mod worker;

pub use broadcast::{JobEventBroadcaster, JobStatusEvent};
pub use client::{ApiClient, ApiError, Credentials, Session, SessionContext};
pub use config::{load_config, Config};
pub use db::{Database, DatabaseError};
pub use error::{ArchiparseError, ConfigError, Result, StorageError, WorkerError};
pub use job::{Job, JobStatus, TransitionError};
pub use model::{Element, ElementDetail, Model, Page};
pub use pipeline::{Pipeline, PipelineContext, PipelineError};
pub use secrets::{resolve_secret, resolve_secret_optional, SecretError};
pub use service::{ElementQuery, JobService, ServiceError};
pub use upload::{PreflightError, UploadLimits, ValidationKind};
pub use watch::{JobSource, JobWatcher, ListPoller, StatusGuard, WatchHandle};
pub use worker::{JobDispatcher, ProcessingJob, WorkerPool};
