//! Downloader: the fetch stage of the engine
//!
//! Each item is a request plus the crawler's helper. The worker executes the
//! target through the configured [`Transport`] and then runs exactly one of
//! the request's callbacks:
//! - 2xx response → the request callback, with the response and the helper
//! - other status or no answer → the request errback, or the downloader's
//!   default handler; error responses travel inside the [`FailedResponse`]

use crate::crawler::pool::{Executor, WorkerPool};
use crate::crawler::request::{FailedResponse, Request};
use crate::crawler::spider::Helper;
use crate::http::Transport;
use crate::{PoolError, TaskError};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::sync::Arc;

/// Fallback for requests without their own errback
pub type ErrorHandler = Arc<dyn Fn(FailedResponse) + Send + Sync + 'static>;

/// One downloader work item
pub struct FetchTask {
    request: Request,
    helper: Arc<Helper>,
}

/// How a fetch ended, reported to the completion hook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Fetched(StatusCode),
    /// Answered with a non-success status
    Rejected(StatusCode),
    Failed,
}

/// Runs fetch tasks against a transport
pub struct FetchExecutor {
    transport: Arc<dyn Transport>,
    on_error: ErrorHandler,
}

#[async_trait]
impl Executor for FetchExecutor {
    type Item = FetchTask;
    type Output = FetchOutcome;

    async fn execute(&self, task: FetchTask) -> Result<FetchOutcome, TaskError> {
        let FetchTask { request, helper } = task;
        let (target, callback, errback) = request.into_parts();

        let (failed, outcome) = match self.transport.execute(&target).await {
            Ok(response) if response.status.is_success() => {
                let status = response.status;
                callback(response, &*helper);
                return Ok(FetchOutcome::Fetched(status));
            }
            Ok(response) => {
                let status = response.status;
                (
                    FailedResponse::rejected(target, response),
                    FetchOutcome::Rejected(status),
                )
            }
            Err(error) => (FailedResponse::new(target, error), FetchOutcome::Failed),
        };

        match errback {
            Some(errback) => errback(failed),
            None => (self.on_error)(failed),
        }
        Ok(outcome)
    }
}

/// Bounded pool of fetch workers
pub type Downloader = WorkerPool<FetchExecutor>;

impl WorkerPool<FetchExecutor> {
    /// Creates a downloader that logs failed requests without an errback
    pub fn new(limit: usize, transport: Arc<dyn Transport>) -> Result<Self, PoolError> {
        Self::with_error_handler(limit, transport, Arc::new(log_failure))
    }

    /// Creates a downloader with a custom default error handler
    pub fn with_error_handler(
        limit: usize,
        transport: Arc<dyn Transport>,
        on_error: ErrorHandler,
    ) -> Result<Self, PoolError> {
        Self::with_executor(
            "Downloader",
            limit,
            FetchExecutor {
                transport,
                on_error,
            },
        )
    }

    /// Submits a request for fetching
    pub fn fetch(&self, request: Request, helper: Arc<Helper>) -> Result<(), PoolError> {
        let url = request.target().url.to_string();
        tracing::debug!("Request was dispatched: {}", url);

        self.submit(FetchTask { request, helper }, move |outcome| match outcome {
            Ok(FetchOutcome::Fetched(status)) => {
                tracing::debug!("Request was processed: {} ({})", url, status)
            }
            Ok(FetchOutcome::Rejected(status)) => {
                tracing::debug!("Request was rejected: {} ({})", url, status)
            }
            Ok(FetchOutcome::Failed) => tracing::debug!("Request failed: {}", url),
            Err(e) => tracing::error!("Request {} did not complete: {}", url, e),
        })
    }
}

fn log_failure(failed: FailedResponse) {
    tracing::error!(
        "{} {} failed: {}",
        failed.target.method,
        failed.target.url,
        failed.error
    );
}
