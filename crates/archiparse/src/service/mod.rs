//! Tenant-scoped job, model and element operations.
//!
//! Every read and write takes the caller's tenant id; a record owned by
//! another tenant is reported exactly like a missing one.

pub mod error;
pub mod quota;

use std::sync::Arc;

use log::{error, info, warn};
use uuid::Uuid;

use crate::broadcast::{JobEventBroadcaster, JobStatusEvent};
use crate::db::element_repo::{self, ElementFilter};
use crate::db::job_repo::{self, JobFilter};
use crate::db::{model_repo, Database};
use crate::job::{timestamp, Job, JobStatus};
use crate::model::{Element, ElementDetail, Model, Page};
use crate::sanitize;
use crate::storage::UploadStorage;
use crate::upload::{self, UploadCandidate, UploadLimits, SNIFF_LEN};
use crate::worker::{JobDispatcher, ProcessingJob};

pub use error::ServiceError;
pub use quota::{QuotaConfig, QuotaError, QuotaLimits, QuotaUsage};

/// Largest accepted page size for every listing.
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Element listing parameters.
#[derive(Debug, Clone)]
pub struct ElementQuery {
    pub model_id: Uuid,
    pub page: u32,
    pub page_size: u32,
    pub ifc_type: Option<String>,
    pub storey_id: Option<Uuid>,
    pub space_id: Option<Uuid>,
}

impl ElementQuery {
    pub fn new(model_id: Uuid, page: u32, page_size: u32) -> Self {
        Self {
            model_id,
            page,
            page_size,
            ifc_type: None,
            storey_id: None,
            space_id: None,
        }
    }
}

pub struct JobService {
    db: Database,
    storage: UploadStorage,
    limits: UploadLimits,
    dispatcher: Option<Arc<dyn JobDispatcher>>,
    broadcaster: JobEventBroadcaster,
    quotas: Option<QuotaConfig>,
}

impl JobService {
    pub fn new(db: Database, storage: UploadStorage, limits: UploadLimits) -> Self {
        Self {
            db,
            storage,
            limits,
            dispatcher: None,
            broadcaster: JobEventBroadcaster::default(),
            quotas: None,
        }
    }

    /// Accepted jobs are handed to `dispatcher`; without one they stay queued.
    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn JobDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn with_broadcaster(mut self, broadcaster: JobEventBroadcaster) -> Self {
        self.broadcaster = broadcaster;
        self
    }

    /// Enforces per-tenant storage and monthly file quotas on `submit`.
    pub fn with_quotas(mut self, quotas: QuotaConfig) -> Self {
        self.quotas = Some(quotas);
        self
    }

    pub fn broadcaster(&self) -> &JobEventBroadcaster {
        &self.broadcaster
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Accepts an upload: pre-flight checks, storage, a queued job and a
    /// processing request.
    pub fn submit(
        &self,
        tenant_id: Uuid,
        filename: &str,
        content: &[u8],
        content_type: Option<&str>,
    ) -> Result<Job, ServiceError> {
        let candidate = UploadCandidate {
            filename,
            size: content.len() as u64,
            content_type,
            head: &content[..content.len().min(SNIFF_LEN)],
        };
        upload::check(&candidate, &self.limits)?;
        if let Some(quotas) = &self.quotas {
            let usage = self.tenant_usage(tenant_id)?;
            if let Err(e) = quotas.limits_for(tenant_id).check(&usage, candidate.size) {
                warn!("Rejected upload for tenant {}: {}", tenant_id, e);
                return Err(e.into());
            }
        }

        let path = self.storage.store(tenant_id, filename, content)?;
        let mut job = Job::new(tenant_id, filename, candidate.size, path.to_string_lossy());
        if let Err(e) = job_repo::insert(&self.db, &job) {
            if let Err(cleanup) = self.storage.remove(&path) {
                warn!("Failed to remove orphaned upload: {}", cleanup);
            }
            return Err(e.into());
        }
        info!(
            "Accepted {} ({} bytes) as job {}",
            sanitize::redact_path(&path),
            job.file_size,
            job.id
        );
        self.broadcaster
            .send(JobStatusEvent::from_job(&job, "Job queued for processing"));

        if let Some(dispatcher) = &self.dispatcher {
            if let Err(e) = dispatcher.dispatch(ProcessingJob::for_job(&job)) {
                error!("Failed to queue job {}: {}", job.id, e);
                job.fail(format!("Failed to queue job: {}", e), None, timestamp::now())
                    .map_err(crate::db::DatabaseError::from)?;
                job_repo::transition(&self.db, &job, JobStatus::EnAttente)?;
                self.broadcaster
                    .send(JobStatusEvent::from_job(&job, "Job could not be queued"));
                return Err(e.into());
            }
        }
        Ok(job)
    }

    /// Reports the tenant's storage and monthly file usage against its limits.
    pub fn quota_usage(&self, tenant_id: Uuid) -> Result<QuotaUsage, ServiceError> {
        let limits = self
            .quotas
            .as_ref()
            .map(|q| q.limits_for(tenant_id))
            .unwrap_or_default();
        let usage = self.tenant_usage(tenant_id)?;
        Ok(QuotaUsage::new(&usage, &limits, self.limits.max_file_size))
    }

    fn tenant_usage(&self, tenant_id: Uuid) -> Result<job_repo::TenantUsage, ServiceError> {
        let since = quota::start_of_month(timestamp::now());
        Ok(job_repo::usage(&self.db, tenant_id, since)?)
    }

    pub fn get_job(&self, tenant_id: Uuid, id: Uuid) -> Result<Job, ServiceError> {
        job_repo::find(&self.db, tenant_id, id)?.ok_or(ServiceError::not_found("Job", id))
    }

    /// Lists jobs newest first; the status filter applies before pagination.
    pub fn list_jobs(
        &self,
        tenant_id: Uuid,
        page: u32,
        page_size: u32,
        status: Option<JobStatus>,
    ) -> Result<Page<Job>, ServiceError> {
        let (limit, offset) = page_bounds(page, page_size)?;
        let filter = JobFilter {
            status,
            limit: Some(limit),
            offset: Some(offset),
        };
        let (items, total) = job_repo::query(&self.db, tenant_id, &filter)?;
        Ok(Page {
            items,
            total,
            page,
            page_size,
        })
    }

    pub fn list_models(
        &self,
        tenant_id: Uuid,
        page: u32,
        page_size: u32,
    ) -> Result<Page<Model>, ServiceError> {
        let (limit, offset) = page_bounds(page, page_size)?;
        let (items, total) = model_repo::list(&self.db, tenant_id, limit, offset)?;
        Ok(Page {
            items,
            total,
            page,
            page_size,
        })
    }

    pub fn get_model(&self, tenant_id: Uuid, id: Uuid) -> Result<Model, ServiceError> {
        model_repo::find(&self.db, tenant_id, id)?.ok_or(ServiceError::not_found("Model", id))
    }

    /// Lists a model's elements ordered by IFC type then name.
    pub fn list_elements(
        &self,
        tenant_id: Uuid,
        query: &ElementQuery,
    ) -> Result<Page<Element>, ServiceError> {
        let (limit, offset) = page_bounds(query.page, query.page_size)?;
        self.get_model(tenant_id, query.model_id)?;

        let filter = ElementFilter {
            model_id: query.model_id,
            ifc_type: query.ifc_type.clone().filter(|t| !t.is_empty()),
            storey_id: query.storey_id,
            space_id: query.space_id,
            limit,
            offset,
        };
        let (items, total) = element_repo::query(&self.db, tenant_id, &filter)?;
        Ok(Page {
            items,
            total,
            page: query.page,
            page_size: query.page_size,
        })
    }

    pub fn get_element(&self, tenant_id: Uuid, id: Uuid) -> Result<ElementDetail, ServiceError> {
        element_repo::find_detail(&self.db, tenant_id, id)?
            .ok_or(ServiceError::not_found("Element", id))
    }
}

/// Validates 1-based paging and converts it to `(limit, offset)`.
fn page_bounds(page: u32, page_size: u32) -> Result<(u64, u64), ServiceError> {
    if page < 1 {
        return Err(ServiceError::InvalidArgument(format!(
            "page must be >= 1, got {}",
            page
        )));
    }
    if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
        return Err(ServiceError::InvalidArgument(format!(
            "page_size must be between 1 and {}, got {}",
            MAX_PAGE_SIZE, page_size
        )));
    }
    let limit = u64::from(page_size);
    Ok((limit, (u64::from(page) - 1) * limit))
}
