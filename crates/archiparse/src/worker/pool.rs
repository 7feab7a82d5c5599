use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use log::{debug, error, info};

use crate::broadcast::JobEventBroadcaster;
use crate::db::Database;
use crate::error::WorkerError;
use crate::pipeline::progress::{BroadcastProgress, NoopProgress};
use crate::pipeline::{Pipeline, PipelineContext};
use crate::worker::job::{JobResult, ProcessingJob};

/// Hands processing requests to whatever runs the pipeline.
pub trait JobDispatcher: Send + Sync {
    fn dispatch(&self, request: ProcessingJob) -> Result<(), WorkerError>;
}

/// Fixed set of worker threads consuming a bounded request queue.
///
/// Shutdown only refuses new requests. Everything already queued is still
/// processed; [`WorkerPool::wait`] closes the queue and returns once the
/// workers have drained it.
pub struct WorkerPool {
    job_sender: Sender<ProcessingJob>,
    result_receiver: Receiver<JobResult>,
    workers: Vec<JoinHandle<()>>,
    shutdown: AtomicBool,
}

impl WorkerPool {
    pub fn new(db: Database, worker_count: usize) -> Result<Self, WorkerError> {
        Self::with_broadcaster(db, worker_count, None)
    }

    /// Starts `worker_count` named worker threads, each publishing status
    /// changes on `broadcaster` when one is given.
    pub fn with_broadcaster(
        db: Database,
        worker_count: usize,
        broadcaster: Option<JobEventBroadcaster>,
    ) -> Result<Self, WorkerError> {
        if worker_count == 0 {
            return Err(WorkerError::SpawnFailed(
                "worker_count must be at least 1".to_string(),
            ));
        }
        let (job_sender, job_receiver) = bounded::<ProcessingJob>(worker_count * 2);
        let (result_sender, result_receiver) = bounded::<JobResult>(worker_count * 2);

        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let worker = Worker {
                id: worker_id,
                jobs: job_receiver.clone(),
                results: result_sender.clone(),
                pipeline: Pipeline::new(db.clone()),
                broadcaster: broadcaster.clone(),
            };
            let spawned = thread::Builder::new()
                .name(format!("archiparse-worker-{}", worker_id))
                .spawn(move || worker.run());
            match spawned {
                Ok(handle) => workers.push(handle),
                // Workers already started exit once `job_sender` is dropped.
                Err(e) => return Err(WorkerError::SpawnFailed(e.to_string())),
            }
        }

        info!("Started {} workers", worker_count);

        Ok(Self {
            job_sender,
            result_receiver,
            workers,
            shutdown: AtomicBool::new(false),
        })
    }

    /// Queues a request, blocking while the queue is full.
    pub fn submit(&self, request: ProcessingJob) -> Result<(), WorkerError> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(WorkerError::ShuttingDown);
        }

        self.job_sender
            .send(request)
            .map_err(|_| WorkerError::ChannelClosed)
    }

    pub fn try_recv_result(&self) -> Option<JobResult> {
        self.result_receiver.try_recv().ok()
    }

    pub fn recv_result(&self) -> Option<JobResult> {
        self.result_receiver.recv().ok()
    }

    /// Stops accepting requests. Queued requests are still processed.
    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Closes the queue and joins the workers after they drain it.
    pub fn wait(self) {
        self.shutdown.store(true, Ordering::Relaxed);
        drop(self.job_sender);

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

impl JobDispatcher for WorkerPool {
    fn dispatch(&self, request: ProcessingJob) -> Result<(), WorkerError> {
        self.submit(request)
    }
}

struct Worker {
    id: usize,
    jobs: Receiver<ProcessingJob>,
    results: Sender<JobResult>,
    pipeline: Pipeline,
    broadcaster: Option<JobEventBroadcaster>,
}

impl Worker {
    fn run(self) {
        debug!("Worker {} started", self.id);

        // Ends only when the queue is closed and empty.
        while let Ok(request) = self.jobs.recv() {
            let result = self.process(request);

            // Outcomes are persisted; an unread result is only dropped.
            match self.results.try_send(result) {
                Ok(()) => {}
                Err(TrySendError::Full(result)) => debug!(
                    "Worker {} dropped result for job {}: result queue full",
                    self.id, result.job_id
                ),
                Err(TrySendError::Disconnected(result)) => debug!(
                    "Worker {} dropped result for job {}: pool released",
                    self.id, result.job_id
                ),
            }
        }

        debug!("Worker {} stopped", self.id);
    }

    fn process(&self, request: ProcessingJob) -> JobResult {
        debug!("Worker {} processing job {}", self.id, request.job_id);
        let ctx = PipelineContext::new(request);
        let (result, _ctx) = match &self.broadcaster {
            Some(broadcaster) => {
                let progress = BroadcastProgress::new(broadcaster.track(ctx.request.job_id));
                self.pipeline.run(ctx, &progress)
            }
            None => self.pipeline.run(ctx, &NoopProgress),
        };
        result
    }
}
