use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::job::Job;

use super::guard::StatusGuard;
use super::source::{JobSource, SourceError};

pub const DEFAULT_DETAIL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_MAX_CONSECUTIVE_ERRORS: u32 = 5;

#[derive(Error, Debug)]
pub enum WatchError {
    #[error(transparent)]
    Source(SourceError),

    #[error("Giving up after {count} consecutive errors: {last}")]
    TooManyErrors { count: u32, last: String },

    #[error("Watch cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchConfig {
    pub interval: Duration,
    /// Consecutive retryable errors tolerated before the watch gives up.
    pub max_consecutive_errors: u32,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_DETAIL_INTERVAL,
            max_consecutive_errors: DEFAULT_MAX_CONSECUTIVE_ERRORS,
        }
    }
}

/// Polls single jobs until they reach a terminal status.
#[derive(Clone)]
pub struct JobWatcher {
    source: Arc<dyn JobSource>,
    config: WatchConfig,
}

impl JobWatcher {
    pub fn new(source: Arc<dyn JobSource>) -> Self {
        Self {
            source,
            config: WatchConfig::default(),
        }
    }

    pub fn with_config(mut self, config: WatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Starts polling `job_id` on the current tokio runtime.
    ///
    /// Polling stops for good on the first terminal observation, on a
    /// non-retryable error, or when the handle is cancelled or dropped.
    pub fn watch(&self, job_id: Uuid) -> WatchHandle {
        let (tx, rx) = watch::channel(None);
        let source = Arc::clone(&self.source);
        let config = self.config;
        let task = tokio::spawn(poll_job(source, job_id, config, tx));

        WatchHandle {
            job_id,
            updates: rx,
            task: Some(task),
        }
    }
}

/// Owner of one running watch. Dropping it stops the polling task.
pub struct WatchHandle {
    job_id: Uuid,
    updates: watch::Receiver<Option<Job>>,
    task: Option<JoinHandle<Result<Job, WatchError>>>,
}

impl WatchHandle {
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    /// Last accepted state, if any poll has succeeded yet.
    pub fn latest(&self) -> Option<Job> {
        self.updates.borrow().clone()
    }

    /// Waits for the next accepted state. Returns `None` once polling ended.
    pub async fn changed(&mut self) -> Option<Job> {
        self.updates.changed().await.ok()?;
        self.updates.borrow_and_update().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }

    pub fn cancel(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Waits for the watch to end and returns the terminal job.
    pub async fn finish(mut self) -> Result<Job, WatchError> {
        let Some(task) = self.task.take() else {
            return Err(WatchError::Cancelled);
        };
        match task.await {
            Ok(outcome) => outcome,
            Err(_) => Err(WatchError::Cancelled),
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn poll_job(
    source: Arc<dyn JobSource>,
    job_id: Uuid,
    config: WatchConfig,
    updates: watch::Sender<Option<Job>>,
) -> Result<Job, WatchError> {
    let mut guard = StatusGuard::for_job(job_id);
    let mut errors = 0u32;

    loop {
        let response = source.job(job_id).await.and_then(|job| {
            if job.id == job_id {
                Ok(job)
            } else {
                Err(SourceError::Retryable(format!(
                    "Received job {} instead of {}",
                    job.id, job_id
                )))
            }
        });
        match response {
            Ok(job) => {
                errors = 0;
                if guard.observe(job) {
                    updates.send_replace(guard.current().cloned());
                }
                if let Some(done) = guard.terminal() {
                    info!("Job {} finished with status {}", job_id, done.status);
                    return Ok(done.clone());
                }
            }
            Err(SourceError::Retryable(message)) => {
                errors += 1;
                if errors > config.max_consecutive_errors {
                    warn!("Stopped watching job {}: {}", job_id, message);
                    return Err(WatchError::TooManyErrors {
                        count: errors,
                        last: message,
                    });
                }
                debug!(
                    "Poll of job {} failed ({}/{}): {}",
                    job_id, errors, config.max_consecutive_errors, message
                );
            }
            Err(e) => {
                warn!("Stopped watching job {}: {}", job_id, e);
                return Err(WatchError::Source(e));
            }
        }

        tokio::time::sleep(config.interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{timestamp, JobStatus};
    use crate::model::Page;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Scripted {
        responses: Mutex<VecDeque<Result<Job, SourceError>>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(responses: Vec<Result<Job, SourceError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl JobSource for Scripted {
        async fn job(&self, _id: Uuid) -> Result<Job, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(SourceError::Retryable("script exhausted".into())))
        }

        async fn jobs(
            &self,
            _page: u32,
            _page_size: u32,
            _status: Option<JobStatus>,
        ) -> Result<Page<Job>, SourceError> {
            unreachable!("detail watcher never lists")
        }
    }

    fn job_in(id: Uuid, status: JobStatus) -> Job {
        let mut job = Job::new(Uuid::nil(), "a.ifcxml", 1, "");
        job.id = id;
        job.status = status;
        if status.is_terminal() {
            job.completed_at = Some(timestamp::now());
        }
        job
    }

    fn watcher(source: Arc<Scripted>) -> JobWatcher {
        JobWatcher::new(source)
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_stops_after_terminal_observation() {
        let id = Uuid::new_v4();
        let source = Scripted::new(vec![
            Ok(job_in(id, JobStatus::EnAttente)),
            Ok(job_in(id, JobStatus::Validation)),
            Ok(job_in(id, JobStatus::Parsing)),
            Ok(job_in(id, JobStatus::Validation)),
            Ok(job_in(id, JobStatus::Termine)),
            Ok(job_in(id, JobStatus::Parsing)),
        ]);

        let handle = watcher(Arc::clone(&source)).watch(id);
        let done = handle.finish().await.unwrap();
        assert_eq!(done.status, JobStatus::Termine);
        assert_eq!(source.calls(), 5);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(source.calls(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_updates_never_regress() {
        let id = Uuid::new_v4();
        let source = Scripted::new(vec![
            Ok(job_in(id, JobStatus::Parsing)),
            Ok(job_in(id, JobStatus::EnAttente)),
            Ok(job_in(id, JobStatus::Transformation)),
            Ok(job_in(id, JobStatus::Echoue)),
        ]);

        let mut handle = watcher(source).watch(id);
        let mut seen = Vec::new();
        while let Some(job) = handle.changed().await {
            seen.push(job.status);
        }
        assert_eq!(
            seen,
            vec![
                JobStatus::Parsing,
                JobStatus::Transformation,
                JobStatus::Echoue
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_errors_within_budget() {
        let id = Uuid::new_v4();
        let source = Scripted::new(vec![
            Err(SourceError::Retryable("No response from server".into())),
            Err(SourceError::Retryable("No response from server".into())),
            Ok(job_in(id, JobStatus::Parsing)),
            Err(SourceError::Retryable("No response from server".into())),
            Ok(job_in(id, JobStatus::Termine)),
        ]);

        let done = watcher(source).watch(id).finish().await.unwrap();
        assert_eq!(done.status, JobStatus::Termine);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_budget_exhausted() {
        let source = Scripted::new(Vec::new());
        let handle = watcher(Arc::clone(&source))
            .with_config(WatchConfig {
                interval: Duration::from_secs(2),
                max_consecutive_errors: 3,
            })
            .watch(Uuid::new_v4());

        match handle.finish().await {
            Err(WatchError::TooManyErrors { count, .. }) => assert_eq!(count, 4),
            other => panic!("unexpected {:?}", other.map(|j| j.status)),
        }
        assert_eq!(source.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_for_another_job_is_not_accepted() {
        let id = Uuid::new_v4();
        let other = Uuid::new_v4();
        let source = Scripted::new(vec![
            Ok(job_in(other, JobStatus::Termine)),
            Ok(job_in(id, JobStatus::Parsing)),
            Ok(job_in(other, JobStatus::Echoue)),
            Ok(job_in(id, JobStatus::Termine)),
        ]);

        let mut handle = watcher(Arc::clone(&source)).watch(id);
        let mut seen = Vec::new();
        while let Some(job) = handle.changed().await {
            seen.push((job.id, job.status));
        }
        assert_eq!(seen, vec![(id, JobStatus::Parsing), (id, JobStatus::Termine)]);
        let done = handle.finish().await.unwrap();
        assert_eq!(done.id, id);
        assert_eq!(source.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_foreign_responses_count_against_error_budget() {
        let id = Uuid::new_v4();
        let other = Uuid::new_v4();
        let source = Scripted::new(vec![
            Ok(job_in(other, JobStatus::Termine)),
            Ok(job_in(other, JobStatus::Termine)),
            Ok(job_in(other, JobStatus::Termine)),
        ]);
        let handle = watcher(source)
            .with_config(WatchConfig {
                interval: Duration::from_secs(2),
                max_consecutive_errors: 2,
            })
            .watch(id);

        assert!(matches!(
            handle.finish().await,
            Err(WatchError::TooManyErrors { count: 3, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_ends_watch() {
        let source = Scripted::new(vec![Err(SourceError::Fatal("Job not found".into()))]);
        let handle = watcher(Arc::clone(&source)).watch(Uuid::new_v4());

        assert!(matches!(handle.finish().await, Err(WatchError::Source(_))));
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_stops_polling() {
        let id = Uuid::new_v4();
        let source = Scripted::new(vec![
            Ok(job_in(id, JobStatus::Parsing)),
            Ok(job_in(id, JobStatus::Parsing)),
            Ok(job_in(id, JobStatus::Parsing)),
        ]);

        let mut handle = watcher(Arc::clone(&source)).watch(id);
        assert_eq!(handle.changed().await.unwrap().status, JobStatus::Parsing);
        assert_eq!(handle.latest().unwrap().status, JobStatus::Parsing);
        drop(handle);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(source.calls(), 1);
    }
}
