use std::sync::Arc;
use std::time::Duration;

use log::debug;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::job::{Job, JobStatus};
use crate::model::Page;

use super::guard::StatusBoard;
use super::source::JobSource;

pub const DEFAULT_LIST_INTERVAL: Duration = Duration::from_secs(5);

/// Result of one list poll.
#[derive(Debug, Clone)]
pub enum ListUpdate {
    Loaded(Page<Job>),
    Failed(String),
}

/// Which slice of the job list to poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListQuery {
    pub page: u32,
    pub page_size: u32,
    pub status: Option<JobStatus>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
            status: None,
        }
    }
}

/// Polls a job list on a fixed interval, whatever it contains.
pub struct ListPoller {
    source: Arc<dyn JobSource>,
    interval: Duration,
}

impl ListPoller {
    pub fn new(source: Arc<dyn JobSource>) -> Self {
        Self {
            source,
            interval: DEFAULT_LIST_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn start(&self, query: ListQuery) -> ListHandle {
        let (tx, rx) = watch::channel(None);
        let source = Arc::clone(&self.source);
        let interval = self.interval;
        let task = tokio::spawn(poll_list(source, query, interval, tx));

        ListHandle {
            updates: rx,
            task: Some(task),
        }
    }
}

/// Owner of a running list poll. Dropping it stops the task.
pub struct ListHandle {
    updates: watch::Receiver<Option<ListUpdate>>,
    task: Option<JoinHandle<()>>,
}

impl ListHandle {
    pub fn latest(&self) -> Option<ListUpdate> {
        self.updates.borrow().clone()
    }

    pub async fn changed(&mut self) -> Option<ListUpdate> {
        self.updates.changed().await.ok()?;
        self.updates.borrow_and_update().clone()
    }

    pub fn cancel(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for ListHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn poll_list(
    source: Arc<dyn JobSource>,
    query: ListQuery,
    interval: Duration,
    updates: watch::Sender<Option<ListUpdate>>,
) {
    let mut board = StatusBoard::new();
    let mut timer = tokio::time::interval(interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        timer.tick().await;

        let update = match source.jobs(query.page, query.page_size, query.status).await {
            Ok(page) => ListUpdate::Loaded(board.merge(page)),
            Err(e) => {
                debug!("Job list poll failed: {}", e);
                ListUpdate::Failed(e.to_string())
            }
        };
        updates.send_replace(Some(update));
    }
}
