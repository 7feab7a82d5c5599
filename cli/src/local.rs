//! Commands that run the pipeline in this process.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};
use uuid::Uuid;

use archiparse::broadcast::JobEventBroadcaster;
use archiparse::config::Config;
use archiparse::db::Database;
use archiparse::job::Job;
use archiparse::storage::UploadStorage;
use archiparse::watch::{JobWatcher, LocalJobs};
use archiparse::{JobDispatcher, JobService, WorkerPool};

use crate::commands::LocalCommand;
use crate::error::CliError;
use crate::output;
use crate::remote::follow_to_end;

const EVENT_CAPACITY: usize = 256;

pub(crate) async fn run(config: Config, command: LocalCommand) -> Result<(), CliError> {
    let db_path = config.database_path().ok_or(CliError::NoDatabasePath)?;
    let db = Database::open(&db_path)?;
    let storage = UploadStorage::new(&config.upload_directory);

    match command {
        LocalCommand::Run { files, tenant } => {
            let broadcaster = JobEventBroadcaster::new(EVENT_CAPACITY);
            let pool = Arc::new(WorkerPool::with_broadcaster(
                db.clone(),
                config.worker_count,
                Some(broadcaster.clone()),
            )?);
            let service = JobService::new(db, storage, config.upload_limits())
                .with_quotas(config.quota.clone())
                .with_dispatcher(Arc::clone(&pool) as Arc<dyn JobDispatcher>)
                .with_broadcaster(broadcaster);

            let outcome = process_files(Arc::new(service), &config, tenant, &files).await;

            pool.shutdown();
            match Arc::try_unwrap(pool) {
                Ok(pool) => pool.wait(),
                Err(_) => warn!("Worker pool still shared at exit, not waiting for workers"),
            }
            outcome
        }
        LocalCommand::Jobs {
            tenant,
            page,
            page_size,
            status,
        } => {
            let service = JobService::new(db, storage, config.upload_limits());
            output::jobs(&service.list_jobs(tenant, page, page_size, status)?);
            Ok(())
        }
        LocalCommand::Quota { tenant } => {
            let service = JobService::new(db, storage, config.upload_limits())
                .with_quotas(config.quota.clone());
            output::json(&service.quota_usage(tenant)?)
        }
    }
}

/// Submits every file, then follows each accepted job to its end.
///
/// Submission stops at the first rejected file, but jobs accepted before it
/// are still followed. A submission error takes precedence over the first
/// job failure.
async fn process_files(
    service: Arc<JobService>,
    config: &Config,
    tenant: Uuid,
    files: &[PathBuf],
) -> Result<(), CliError> {
    let mut submitted = Vec::with_capacity(files.len());
    let mut rejected = None;
    for file in files {
        match submit_file(&service, tenant, file) {
            Ok(job) => {
                output::job_line(&job);
                submitted.push(job.id);
            }
            Err(e) => {
                rejected = Some(e);
                break;
            }
        }
    }
    info!("Submitted {} of {} file(s)", submitted.len(), files.len());

    let source = Arc::new(LocalJobs::new(service, tenant));
    let watcher = JobWatcher::new(source).with_config(config.polling.watch_config());
    let mut first_failure = None;
    for id in submitted {
        if let Err(e) = follow_to_end(&watcher, id).await {
            first_failure.get_or_insert(e);
        }
    }
    rejected.or(first_failure).map_or(Ok(()), Err)
}

fn submit_file(service: &JobService, tenant: Uuid, file: &Path) -> Result<Job, CliError> {
    let content = std::fs::read(file).map_err(|e| CliError::ReadFile {
        path: file.to_path_buf(),
        source: e,
    })?;
    let filename = file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(service.submit(tenant, &filename, &content, None)?)
}
