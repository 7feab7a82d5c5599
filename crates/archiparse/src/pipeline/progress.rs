use crate::broadcast::job_progress::JobStatusTracker;
use crate::job::Job;

/// Events emitted by the pipeline as a job moves through its states.
pub enum ProgressEvent<'a> {
    /// The job entered a new non-failed state.
    Status { job: &'a Job, message: &'a str },
    /// The job entered `ECHOUE`; the reason is on the job.
    Failed { job: &'a Job },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent<'_>);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent<'_>) {}
}

/// Bridges pipeline events to the job event broadcast channel.
pub struct BroadcastProgress {
    tracker: JobStatusTracker,
}

impl BroadcastProgress {
    pub fn new(tracker: JobStatusTracker) -> Self {
        Self { tracker }
    }
}

impl ProgressReporter for BroadcastProgress {
    fn report(&self, event: ProgressEvent<'_>) {
        match event {
            ProgressEvent::Status { job, message } => self.tracker.publish(job, message),
            ProgressEvent::Failed { job } => {
                let message = job.error_message.as_deref().unwrap_or("Processing failed");
                self.tracker.publish(job, message);
            }
        }
    }
}
