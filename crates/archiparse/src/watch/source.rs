use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::client::{ApiClient, ApiError, SessionContext};
use crate::job::{Job, JobStatus};
use crate::model::Page;
use crate::service::{JobService, ServiceError};

/// Why a poll produced no job.
#[derive(Error, Debug)]
pub enum SourceError {
    /// Transient; the next poll may succeed.
    #[error("{0}")]
    Retryable(String),

    #[error("{0}")]
    Fatal(String),
}

impl SourceError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, SourceError::Retryable(_))
    }
}

impl From<ApiError> for SourceError {
    fn from(e: ApiError) -> Self {
        if e.is_retryable() {
            SourceError::Retryable(e.to_string())
        } else {
            SourceError::Fatal(e.to_string())
        }
    }
}

impl From<ServiceError> for SourceError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::Database(_) | ServiceError::Storage(_) => {
                SourceError::Retryable(e.to_string())
            }
            _ => SourceError::Fatal(e.to_string()),
        }
    }
}

/// Where pollers read job state from.
#[async_trait]
pub trait JobSource: Send + Sync {
    async fn job(&self, id: Uuid) -> Result<Job, SourceError>;

    async fn jobs(
        &self,
        page: u32,
        page_size: u32,
        status: Option<JobStatus>,
    ) -> Result<Page<Job>, SourceError>;
}

/// Jobs served by the REST API.
pub struct RemoteJobs {
    client: ApiClient,
    ctx: Arc<SessionContext>,
}

impl RemoteJobs {
    pub fn new(client: ApiClient, ctx: Arc<SessionContext>) -> Self {
        Self { client, ctx }
    }
}

#[async_trait]
impl JobSource for RemoteJobs {
    async fn job(&self, id: Uuid) -> Result<Job, SourceError> {
        Ok(self.client.get_job(&self.ctx, id).await?)
    }

    async fn jobs(
        &self,
        page: u32,
        page_size: u32,
        status: Option<JobStatus>,
    ) -> Result<Page<Job>, SourceError> {
        Ok(self
            .client
            .list_jobs(&self.ctx, page, page_size, status)
            .await?)
    }
}

/// Jobs read straight from a local [`JobService`].
pub struct LocalJobs {
    service: Arc<JobService>,
    tenant_id: Uuid,
}

impl LocalJobs {
    pub fn new(service: Arc<JobService>, tenant_id: Uuid) -> Self {
        Self { service, tenant_id }
    }
}

#[async_trait]
impl JobSource for LocalJobs {
    async fn job(&self, id: Uuid) -> Result<Job, SourceError> {
        let service = Arc::clone(&self.service);
        let tenant_id = self.tenant_id;
        let job = tokio::task::spawn_blocking(move || service.get_job(tenant_id, id))
            .await
            .map_err(|e| SourceError::Fatal(format!("Job lookup task failed: {}", e)))??;
        Ok(job)
    }

    async fn jobs(
        &self,
        page: u32,
        page_size: u32,
        status: Option<JobStatus>,
    ) -> Result<Page<Job>, SourceError> {
        let service = Arc::clone(&self.service);
        let tenant_id = self.tenant_id;
        let jobs = tokio::task::spawn_blocking(move || {
            service.list_jobs(tenant_id, page, page_size, status)
        })
        .await
        .map_err(|e| SourceError::Fatal(format!("Job listing task failed: {}", e)))??;
        Ok(jobs)
    }
}
