//! Polling of job state: a detail watcher that stops on the first terminal
//! observation and a list poller that runs until cancelled.

pub mod detail;
pub mod guard;
pub mod list;
pub mod source;

pub use detail::{
    JobWatcher, WatchConfig, WatchError, WatchHandle, DEFAULT_DETAIL_INTERVAL,
    DEFAULT_MAX_CONSECUTIVE_ERRORS,
};
pub use guard::{StatusBoard, StatusGuard};
pub use list::{ListHandle, ListPoller, ListQuery, ListUpdate, DEFAULT_LIST_INTERVAL};
pub use source::{JobSource, LocalJobs, RemoteJobs, SourceError};
