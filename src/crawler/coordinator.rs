//! Crawler coordinator - orchestration of the two engine stages
//!
//! The crawler runs two loops side by side:
//! - the request loop moves requests from the [`RequestScheduler`] into the
//!   [`Downloader`]
//! - the job loop moves jobs from the [`JobScheduler`] into the [`Scraper`]
//!
//! # Termination
//!
//! The request loop ends once its scheduler is empty and nothing is being
//! fetched: only fetch callbacks create requests, so no request can appear
//! afterwards. The job loop additionally waits for the request loop to close,
//! because fetch callbacks are also the only producers of jobs.
//!
//! Both loops sleep on change notifications (a put, a completion, the
//! request loop closing, or cancellation) instead of polling.

use crate::crawler::fetcher::Downloader;
use crate::crawler::scheduler::{JobScheduler, RequestScheduler};
use crate::crawler::scraper::Scraper;
use crate::crawler::spider::{Helper, Spider};
use crate::TalpaError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Second engine stage, present only when jobs are processed
struct JobStage {
    scheduler: Arc<JobScheduler>,
    scraper: Scraper,
}

/// State shared between the crawler handle and its loops
struct Shared {
    requests: Arc<RequestScheduler>,
    downloader: Downloader,
    jobs: Option<JobStage>,
    cancel: CancellationToken,
    request_loop_closed: watch::Sender<bool>,
    job_loop_closed: watch::Sender<bool>,
}

/// Main crawl orchestrator
pub struct Crawler {
    spiders: Vec<Box<dyn Spider>>,
    shared: Arc<Shared>,
    started: AtomicBool,
}

impl Crawler {
    /// Assembles a crawler from its parts
    ///
    /// # Arguments
    ///
    /// * `spiders` - Spiders providing the seed requests
    /// * `requests` - Request queue feeding the downloader
    /// * `downloader` - Fetch pool, opened by [`Crawler::start`]
    /// * `jobs` / `scraper` - Optional processing stage, both or neither
    ///
    /// # Returns
    ///
    /// * `Ok(Crawler)` - A crawler ready to be started
    /// * `Err(TalpaError::MismatchedPipeline)` - Only one of `jobs` and
    ///   `scraper` was provided
    pub fn new(
        spiders: Vec<Box<dyn Spider>>,
        requests: RequestScheduler,
        downloader: Downloader,
        jobs: Option<JobScheduler>,
        scraper: Option<Scraper>,
    ) -> Result<Self, TalpaError> {
        let jobs = match (jobs, scraper) {
            (Some(scheduler), Some(scraper)) => Some(JobStage {
                scheduler: Arc::new(scheduler),
                scraper,
            }),
            (None, None) => None,
            _ => return Err(TalpaError::MismatchedPipeline),
        };

        let (request_loop_closed, _) = watch::channel(false);
        let (job_loop_closed, _) = watch::channel(false);

        Ok(Self {
            spiders,
            shared: Arc::new(Shared {
                requests: Arc::new(requests),
                downloader,
                jobs,
                cancel: CancellationToken::new(),
                request_loop_closed,
                job_loop_closed,
            }),
            started: AtomicBool::new(false),
        })
    }

    /// Opens the pools, seeds the request queue and launches both loops
    ///
    /// Must be called from within a tokio runtime. On error nothing is left
    /// running: pools opened here are released, no seed is queued and the
    /// crawler counts as not started.
    pub fn start(&self) -> Result<(), TalpaError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(TalpaError::AlreadyStarted);
        }

        if let Err(e) = self.launch() {
            self.started.store(false, Ordering::SeqCst);
            tracing::error!("Crawler failed to start: {}", e);
            return Err(e);
        }

        tracing::info!("Crawler started with {} spiders", self.spiders.len());
        Ok(())
    }

    fn launch(&self) -> Result<(), TalpaError> {
        let shared = &self.shared;

        shared.downloader.open()?;
        if let Some(stage) = &shared.jobs {
            if let Err(e) = stage.scraper.open() {
                shared.downloader.release();
                return Err(e.into());
            }
        }

        let mut seeds = Vec::new();
        for spider in &self.spiders {
            let requests = spider.start_requests();
            tracing::info!(spider = spider.name(), "Seeding {} requests", requests.len());
            seeds.extend(requests);
        }
        if let Err(e) = shared.requests.put(seeds) {
            shared.downloader.release();
            if let Some(stage) = &shared.jobs {
                stage.scraper.release();
            }
            return Err(e.into());
        }

        let helper = Arc::new(Helper::new(
            Arc::clone(&shared.requests),
            shared.jobs.as_ref().map(|stage| Arc::clone(&stage.scheduler)),
        ));

        tokio::spawn(
            request_loop(Arc::clone(shared), helper)
                .instrument(tracing::info_span!("request_loop")),
        );
        if shared.jobs.is_some() {
            tokio::spawn(job_loop(Arc::clone(shared)).instrument(tracing::info_span!("job_loop")));
        } else {
            shared.job_loop_closed.send_replace(true);
        }

        Ok(())
    }

    /// Cancels both loops and waits for them to exit
    ///
    /// Queued requests and jobs are abandoned; items already handed to a pool
    /// still run to completion.
    pub async fn stop(&self) {
        tracing::info!("Stopping crawler");
        self.shared.cancel.cancel();
        self.wait().await;
    }

    /// Resolves once both loops have exited
    pub async fn wait(&self) {
        if !self.started.load(Ordering::SeqCst) {
            return;
        }

        for closed in [&self.shared.request_loop_closed, &self.shared.job_loop_closed] {
            let mut receiver = closed.subscribe();
            // The sender lives as long as `self`, so this cannot fail
            let _ = receiver.wait_for(|closed| *closed).await;
        }
    }

    /// Whether both loops have exited
    pub fn is_closed(&self) -> bool {
        *self.shared.request_loop_closed.borrow() && *self.shared.job_loop_closed.borrow()
    }

    pub fn requests(&self) -> &RequestScheduler {
        &self.shared.requests
    }

    pub fn downloader(&self) -> &Downloader {
        &self.shared.downloader
    }

    pub fn jobs(&self) -> Option<&JobScheduler> {
        self.shared.jobs.as_ref().map(|stage| stage.scheduler.as_ref())
    }

    pub fn scraper(&self) -> Option<&Scraper> {
        self.shared.jobs.as_ref().map(|stage| &stage.scraper)
    }
}

async fn request_loop(shared: Arc<Shared>, helper: Arc<Helper>) {
    let requests = &shared.requests;
    let downloader = &shared.downloader;

    loop {
        if shared.cancel.is_cancelled() {
            tracing::info!("Request loop cancelled");
            break;
        }

        // In-flight must be read before the queue: callbacks enqueue before
        // their fetch stops counting as in flight
        let in_flight = downloader.num_waiting_jobs();
        if in_flight < downloader.num_workers() && !requests.is_empty() {
            match requests.get(1) {
                Ok(batch) => {
                    for request in batch {
                        if let Err(e) = downloader.fetch(request, Arc::clone(&helper)) {
                            tracing::error!("Failed to dispatch request: {}", e);
                        }
                    }
                }
                Err(e) => {
                    tracing::error!("Request queue unavailable: {}", e);
                    break;
                }
            }
            continue;
        }

        if in_flight == 0 && requests.is_empty() {
            tracing::debug!("No pending requests and no active fetches");
            break;
        }

        tracing::trace!(pending = requests.len(), in_flight, "Request loop waiting");
        tokio::select! {
            _ = shared.cancel.cancelled() => {}
            _ = requests.pushed() => {}
            _ = downloader.completed() => {}
        }
    }

    if let Err(e) = requests.dispose() {
        tracing::warn!("{}", e);
    }
    if let Err(e) = downloader.close().await {
        tracing::warn!("{}", e);
    }
    shared.request_loop_closed.send_replace(true);
    tracing::info!("Request loop closed");
}

async fn job_loop(shared: Arc<Shared>) {
    let Some(stage) = shared.jobs.as_ref() else {
        shared.job_loop_closed.send_replace(true);
        return;
    };
    let jobs = &stage.scheduler;
    let scraper = &stage.scraper;
    let mut request_loop_closed = shared.request_loop_closed.subscribe();

    loop {
        if shared.cancel.is_cancelled() {
            tracing::info!("Job loop cancelled");
            break;
        }

        let upstream_closed = *request_loop_closed.borrow_and_update();
        let in_flight = scraper.num_waiting_jobs();
        if in_flight < scraper.num_workers() && !jobs.is_empty() {
            match jobs.get(1) {
                Ok(batch) => {
                    for job in batch {
                        if let Err(e) = scraper.send(job) {
                            tracing::error!("Failed to dispatch job: {}", e);
                        }
                    }
                }
                Err(e) => {
                    tracing::error!("Job queue unavailable: {}", e);
                    break;
                }
            }
            continue;
        }

        if upstream_closed && in_flight == 0 && jobs.is_empty() {
            tracing::debug!("Request loop closed, no pending jobs and no active jobs");
            break;
        }

        tracing::trace!(pending = jobs.len(), in_flight, upstream_closed, "Job loop waiting");
        tokio::select! {
            _ = shared.cancel.cancelled() => {}
            _ = jobs.pushed() => {}
            _ = scraper.completed() => {}
            _ = request_loop_closed.changed(), if !upstream_closed => {}
        }
    }

    if let Err(e) = jobs.dispose() {
        tracing::warn!("{}", e);
    }
    if let Err(e) = scraper.close().await {
        tracing::warn!("{}", e);
    }
    shared.job_loop_closed.send_replace(true);
    tracing::info!("Job loop closed");
}
