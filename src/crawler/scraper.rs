//! Scraper: the processing stage of the engine
//!
//! Jobs are synchronous closures, typically parsing or storage work, so each
//! one runs on tokio's blocking thread pool while a worker awaits it.

use crate::crawler::pool::{task_error, Executor, WorkerPool};
use crate::crawler::request::Job;
use crate::{PoolError, TaskError};
use async_trait::async_trait;

/// Runs jobs on the blocking thread pool
pub struct JobExecutor;

#[async_trait]
impl Executor for JobExecutor {
    type Item = Job;
    type Output = ();

    async fn execute(&self, job: Job) -> Result<(), TaskError> {
        tokio::task::spawn_blocking(move || job.run())
            .await
            .map_err(task_error)
    }
}

/// Bounded pool of job workers
pub type Scraper = WorkerPool<JobExecutor>;

impl WorkerPool<JobExecutor> {
    pub fn new(limit: usize) -> Result<Self, PoolError> {
        Self::with_executor("Scraper", limit, JobExecutor)
    }

    /// Submits a job for execution
    pub fn send(&self, job: Job) -> Result<(), PoolError> {
        tracing::trace!("Job was dispatched");
        self.submit(job, |outcome| match outcome {
            Ok(()) => tracing::trace!("Job was finished"),
            Err(e) => tracing::error!("Job failed: {}", e),
        })
    }
}
