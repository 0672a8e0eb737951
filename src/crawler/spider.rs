//! Spider contract and the helper handed to fetch callbacks

use crate::crawler::request::{Job, Request};
use crate::crawler::scheduler::{JobScheduler, RequestScheduler};
use crate::SchedulerError;
use std::sync::Arc;

/// A site-specific crawler plugged into the engine
///
/// A spider only produces seed requests; everything after that happens in
/// the callbacks attached to those requests.
pub trait Spider: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Initial requests, each carrying its own success callback
    fn start_requests(&self) -> Vec<Request>;
}

/// Enqueue capability passed to every success callback
///
/// One helper is shared by all callbacks of a crawler. It only holds the two
/// schedulers, both of which are internally synchronized. Callbacks receive it
/// by reference, so it cannot outlive the call or leak into a job.
pub struct Helper {
    requests: Arc<RequestScheduler>,
    jobs: Option<Arc<JobScheduler>>,
}

impl Helper {
    pub(crate) fn new(requests: Arc<RequestScheduler>, jobs: Option<Arc<JobScheduler>>) -> Self {
        Self { requests, jobs }
    }

    /// Enqueues follow-up requests
    pub fn put_request(
        &self,
        requests: impl IntoIterator<Item = Request>,
    ) -> Result<(), SchedulerError> {
        self.requests.put(requests)
    }

    /// Enqueues jobs for the scraper
    pub fn put_job(&self, jobs: impl IntoIterator<Item = Job>) -> Result<(), SchedulerError> {
        match &self.jobs {
            Some(scheduler) => scheduler.put(jobs),
            None => Err(SchedulerError::NoJobScheduler),
        }
    }
}
