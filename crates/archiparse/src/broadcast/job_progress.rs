//! Job status broadcaster for in-process status streaming.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::job::{Job, JobStatus};

/// One observed status change of a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusEvent {
    pub job_id: Uuid,
    pub tenant_id: Uuid,
    /// Original filename being processed.
    pub filename: String,
    pub status: JobStatus,
    /// Coarse phase indicator for display.
    pub progress: u8,
    /// Human-readable message describing the change.
    pub message: String,
    /// Failure reason (set on `ECHOUE`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl JobStatusEvent {
    /// Builds an event from the job's current state.
    pub fn from_job(job: &Job, message: &str) -> Self {
        Self {
            job_id: job.id,
            tenant_id: job.tenant_id,
            filename: job.filename.clone(),
            status: job.status,
            progress: job.status.progress(),
            message: message.to_string(),
            error: job.error_message.clone(),
            timestamp: job.updated_at.unwrap_or(job.created_at),
        }
    }
}

/// Broadcasts job status events to any number of subscribers.
#[derive(Clone)]
pub struct JobEventBroadcaster {
    sender: Arc<broadcast::Sender<JobStatusEvent>>,
}

impl JobEventBroadcaster {
    /// Creates a new broadcaster with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Sends an event to all subscribers.
    pub fn send(&self, event: JobStatusEvent) {
        // No active receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobStatusEvent> {
        self.sender.subscribe()
    }

    /// Creates a tracker for one job.
    pub fn track(&self, job_id: Uuid) -> JobStatusTracker {
        JobStatusTracker {
            job_id,
            sender: Arc::clone(&self.sender),
        }
    }
}

impl Default for JobEventBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Publishes the status changes of a single job.
pub struct JobStatusTracker {
    job_id: Uuid,
    sender: Arc<broadcast::Sender<JobStatusEvent>>,
}

impl JobStatusTracker {
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    /// Publishes the job's current status.
    pub fn publish(&self, job: &Job, message: &str) {
        debug_assert_eq!(job.id, self.job_id);
        let _ = self.sender.send(JobStatusEvent::from_job(job, message));
    }
}
