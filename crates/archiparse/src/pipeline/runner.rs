use log::{debug, error, info, warn};
use serde_json::Value;
use tracing::info_span;

use crate::db::{job_repo, Database};
use crate::job::{timestamp, Job, JobStatus, ValidationError};
use crate::sanitize;
use crate::worker::job::JobResult;

use super::context::PipelineContext;
use super::error::PipelineError;
use super::progress::{ProgressEvent, ProgressReporter};
use super::{parser, transform, validation};

/// Warnings beyond this count are summarized in job metadata.
const MAX_RECORDED_WARNINGS: usize = 100;

pub struct Pipeline {
    db: Database,
}

impl Pipeline {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Run the full pipeline for a single job.
    /// Returns a (JobResult, PipelineContext) pair.
    pub fn run(
        &self,
        mut ctx: PipelineContext,
        progress: &dyn ProgressReporter,
    ) -> (JobResult, PipelineContext) {
        let filename = sanitize::redact_path(&ctx.request.file_path);
        let _pipeline_span = info_span!("pipeline",
            job_id = %ctx.request.job_id,
            tenant_id = %ctx.request.tenant_id,
            filename = %filename,
        )
        .entered();

        // Step 1: Claim
        let mut job = {
            let _step = info_span!("claim").entered();
            match job_repo::claim(
                &self.db,
                ctx.request.tenant_id,
                ctx.request.job_id,
                timestamp::now(),
            ) {
                Ok(Some(job)) => job,
                Ok(None) => {
                    debug!("Job {} is not queued, skipping", ctx.request.job_id);
                    return (JobResult::skipped(&ctx.request), ctx);
                }
                Err(e) => {
                    error!("Failed to claim job {}: {}", ctx.request.job_id, e);
                    let result = JobResult::aborted(&ctx.request, e.to_string());
                    return (result, ctx);
                }
            }
        };
        info!("Job {} {} -> {}", job.id, JobStatus::EnAttente, job.status);
        progress.report(ProgressEvent::Status {
            job: &job,
            message: "Validating file...",
        });

        // Step 2: Validate
        {
            let _step = info_span!("validate").entered();
            let report = match validation::validate_path(&ctx.request.file_path) {
                Ok(report) => report,
                Err(e) => {
                    let message = format!("Validation failed: {}", e);
                    return self.fail(ctx, job, message, None, progress);
                }
            };
            job.ifc_version = report.version;
            if !report.is_valid() {
                let message = report.failure_message();
                let errors = report.errors.clone();
                ctx.report = Some(report);
                return self.fail(ctx, job, message, Some(errors), progress);
            }
            ctx.report = Some(report);
            if let Err(e) = self.advance(&mut job, JobStatus::Valide, "Validation passed", progress)
            {
                let message = format!("Validation failed: {}", e);
                return self.fail(ctx, job, message, None, progress);
            }
        }

        // Step 3: Parse
        {
            let _step = info_span!("parse").entered();
            let parsed = self
                .advance(&mut job, JobStatus::Parsing, "Parsing entities...", progress)
                .and_then(|()| parser::parse_path(&ctx.request.file_path));
            match parsed {
                Ok(document) => ctx.document = Some(document),
                Err(e) => {
                    let message = format!("Parsing error: {}", e);
                    return self.fail(ctx, job, message, None, progress);
                }
            }
        }

        // Step 4: Transform and persist
        {
            let _step = info_span!("transform").entered();
            if let Err(e) = self.step_transform(&mut ctx, &mut job, progress) {
                let message = format!("Transformation error: {}", e);
                return self.fail(ctx, job, message, None, progress);
            }
        }

        // Step 5: Complete
        let _step = info_span!("complete").entered();
        let completed = self.advance(&mut job, JobStatus::Termine, "Processing complete", progress);
        if let Err(e) = completed {
            let message = format!("Transformation error: {}", e);
            return self.fail(ctx, job, message, None, progress);
        }

        let result = match ctx.transformed.as_ref() {
            Some(transformed) => JobResult::success(&job, transformed.model.id),
            None => JobResult::failure(&job),
        };
        ctx.job = Some(job);
        (result, ctx)
    }

    fn step_transform(
        &self,
        ctx: &mut PipelineContext,
        job: &mut Job,
        progress: &dyn ProgressReporter,
    ) -> Result<(), PipelineError> {
        self.advance(job, JobStatus::Transformation, "Building model...", progress)?;

        let document = ctx
            .document
            .take()
            .ok_or_else(|| PipelineError::Transform("No parsed document".to_string()))?;
        let transformed = transform::transform(&document, job)?;
        transform::persist(&self.db, &transformed)?;

        let model = &transformed.model;
        debug!(
            "Job {} produced model {} ({} elements, {} relationships)",
            job.id, model.id, model.statistics.elements, model.statistics.relationships
        );
        job.metadata
            .insert("model_id".into(), Value::String(model.id.to_string()));
        job.metadata.insert(
            "statistics".into(),
            serde_json::to_value(model.statistics).unwrap_or(Value::Null),
        );
        if !transformed.warnings.is_empty() {
            warn!(
                "Job {} transformed with {} warning(s)",
                job.id,
                transformed.warnings.len()
            );
            let recorded: Vec<Value> = transformed
                .warnings
                .iter()
                .take(MAX_RECORDED_WARNINGS)
                .map(|w| Value::String(w.to_string()))
                .collect();
            job.metadata
                .insert("warnings".into(), Value::Array(recorded));
            job.metadata.insert(
                "warning_count".into(),
                Value::from(transformed.warnings.len() as u64),
            );
        }

        ctx.warnings.extend(transformed.warnings.iter().cloned());
        ctx.transformed = Some(transformed);
        Ok(())
    }

    /// Applies and persists one success-path transition. The in-memory job
    /// only changes once the stored row has moved.
    fn advance(
        &self,
        job: &mut Job,
        to: JobStatus,
        message: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<(), PipelineError> {
        let from = job.status;
        let mut next = job.clone();
        next.advance(to, timestamp::now())?;
        job_repo::transition(&self.db, &next, from)?;
        *job = next;

        info!("Job {} {} -> {}", job.id, from, to);
        progress.report(ProgressEvent::Status { job, message });
        Ok(())
    }

    fn fail(
        &self,
        mut ctx: PipelineContext,
        mut job: Job,
        message: String,
        validation_errors: Option<Vec<ValidationError>>,
        progress: &dyn ProgressReporter,
    ) -> (JobResult, PipelineContext) {
        let from = job.status;
        if let Err(e) = job.fail(message, validation_errors, timestamp::now()) {
            error!("Cannot fail job {}: {}", job.id, e);
            return (JobResult::aborted(&ctx.request, e.to_string()), ctx);
        }
        warn!(
            "Job {} {} -> {}: {}",
            job.id,
            from,
            job.status,
            job.error_message.as_deref().unwrap_or_default()
        );

        if let Err(e) = job_repo::transition(&self.db, &job, from) {
            error!("Failed to record failure of job {}: {}", job.id, e);
            return (JobResult::aborted(&ctx.request, e.to_string()), ctx);
        }
        progress.report(ProgressEvent::Failed { job: &job });

        let result = JobResult::failure(&job);
        ctx.job = Some(job);
        (result, ctx)
    }
}
