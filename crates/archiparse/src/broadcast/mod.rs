//! Broadcasting of job status changes for in-process subscribers.

pub mod job_progress;

pub use job_progress::{JobEventBroadcaster, JobStatusEvent, JobStatusTracker};
