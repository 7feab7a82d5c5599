pub mod job;
pub mod pool;

pub use job::{JobResult, ProcessingJob};
pub use pool::{JobDispatcher, WorkerPool};
