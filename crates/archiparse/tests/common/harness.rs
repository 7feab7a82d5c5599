//! Isolated environment for running jobs end to end.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use tokio::sync::broadcast;
use uuid::Uuid;

use archiparse::broadcast::{JobEventBroadcaster, JobStatusEvent};
use archiparse::db::{job_repo, Database};
use archiparse::job::Job;
use archiparse::service::JobService;
use archiparse::storage::UploadStorage;
use archiparse::upload::UploadLimits;
use archiparse::worker::WorkerPool;

pub struct TestHarness {
    temp_dir: TempDir,
    pub upload_dir: PathBuf,
    pub db: Database,
    pub service: Arc<JobService>,
    broadcaster: JobEventBroadcaster,
    pool: Option<Arc<WorkerPool>>,
}

impl TestHarness {
    /// Harness with a two-worker pool processing every submission.
    pub fn new() -> Self {
        Self::build(Some(2), UploadLimits::default())
    }

    /// Harness whose submissions stay queued.
    pub fn without_workers() -> Self {
        Self::build(None, UploadLimits::default())
    }

    pub fn with_limits(limits: UploadLimits) -> Self {
        Self::build(None, limits)
    }

    fn build(workers: Option<usize>, limits: UploadLimits) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let upload_dir = temp_dir.path().join("uploads");
        let db = Database::open(&temp_dir.path().join("data").join("archiparse.db"))
            .expect("Failed to open database");
        let broadcaster = JobEventBroadcaster::new(256);

        let mut service = JobService::new(db.clone(), UploadStorage::new(&upload_dir), limits)
            .with_broadcaster(broadcaster.clone());
        let pool = workers.map(|n| {
            Arc::new(
                WorkerPool::with_broadcaster(db.clone(), n, Some(broadcaster.clone()))
                    .expect("Failed to start worker pool"),
            )
        });
        if let Some(pool) = &pool {
            service = service.with_dispatcher(pool.clone());
        }

        Self {
            temp_dir,
            upload_dir,
            db,
            service: Arc::new(service),
            broadcaster,
            pool,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobStatusEvent> {
        self.broadcaster.subscribe()
    }

    pub fn submit(&self, tenant_id: Uuid, filename: &str, content: &str) -> Job {
        self.service
            .submit(tenant_id, filename, content.as_bytes(), None)
            .expect("submission rejected")
    }

    /// Polls the database until the job is terminal.
    pub fn wait_for_terminal(&self, tenant_id: Uuid, id: Uuid) -> Job {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let job = job_repo::find(&self.db, tenant_id, id)
                .expect("lookup failed")
                .expect("job disappeared");
            if job.is_terminal() {
                return job;
            }
            assert!(
                Instant::now() < deadline,
                "job {} stuck in {}",
                id,
                job.status
            );
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    pub fn path(&self) -> &std::path::Path {
        self.temp_dir.path()
    }
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        if let Some(pool) = &self.pool {
            pool.shutdown();
        }
    }
}
