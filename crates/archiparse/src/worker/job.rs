use std::path::PathBuf;

use uuid::Uuid;

use crate::job::{Job, JobStatus};

/// A request to run the pipeline for one stored job.
///
/// Requests are idempotent: the pipeline claims the job before touching it,
/// so a duplicate request for the same job is skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingJob {
    pub job_id: Uuid,
    pub tenant_id: Uuid,
    pub file_path: PathBuf,
}

impl ProcessingJob {
    pub fn new(job_id: Uuid, tenant_id: Uuid, file_path: impl Into<PathBuf>) -> Self {
        Self {
            job_id,
            tenant_id,
            file_path: file_path.into(),
        }
    }

    pub fn for_job(job: &Job) -> Self {
        Self::new(job.id, job.tenant_id, &job.file_path)
    }
}

/// Final state of one pipeline run.
#[derive(Debug, Clone)]
pub struct JobResult {
    pub job_id: Uuid,
    pub tenant_id: Uuid,
    pub success: bool,
    /// `None` when the request was skipped because the job was not claimable.
    pub status: Option<JobStatus>,
    pub model_id: Option<Uuid>,
    pub error: Option<String>,
}

impl JobResult {
    pub fn success(job: &Job, model_id: Uuid) -> Self {
        Self {
            job_id: job.id,
            tenant_id: job.tenant_id,
            success: true,
            status: Some(job.status),
            model_id: Some(model_id),
            error: None,
        }
    }

    pub fn failure(job: &Job) -> Self {
        Self {
            job_id: job.id,
            tenant_id: job.tenant_id,
            success: false,
            status: Some(job.status),
            model_id: None,
            error: job.error_message.clone(),
        }
    }

    /// The pipeline could not run or record its outcome.
    pub fn aborted(request: &ProcessingJob, error: String) -> Self {
        Self {
            job_id: request.job_id,
            tenant_id: request.tenant_id,
            success: false,
            status: None,
            model_id: None,
            error: Some(error),
        }
    }

    pub fn skipped(request: &ProcessingJob) -> Self {
        Self {
            job_id: request.job_id,
            tenant_id: request.tenant_id,
            success: false,
            status: None,
            model_id: None,
            error: None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.status.is_none() && self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::timestamp;

    #[test]
    fn test_request_for_job() {
        let job = Job::new(Uuid::new_v4(), "a.ifcxml", 3, "/data/t/a.ifcxml");
        let request = ProcessingJob::for_job(&job);
        assert_eq!(request.job_id, job.id);
        assert_eq!(request.tenant_id, job.tenant_id);
        assert_eq!(request.file_path, PathBuf::from("/data/t/a.ifcxml"));
    }

    #[test]
    fn test_result_constructors() {
        let mut job = Job::new(Uuid::new_v4(), "a.ifcxml", 3, "/tmp/a.ifcxml");
        job.fail("Parsing error: boom", None, timestamp::now()).unwrap();

        let failed = JobResult::failure(&job);
        assert!(!failed.success);
        assert_eq!(failed.status, Some(JobStatus::Echoue));
        assert_eq!(failed.error.as_deref(), Some("Parsing error: boom"));
        assert!(!failed.is_skipped());

        let skipped = JobResult::skipped(&ProcessingJob::for_job(&job));
        assert!(skipped.is_skipped());
        assert!(!skipped.success);
    }
}
