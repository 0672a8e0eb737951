//! The crawl engine
//!
//! This module contains the two-stage pipeline:
//! - Request and job schedulers (priority queue and FIFO)
//! - Bounded worker pools for fetching and for job processing
//! - The crawler coordinating both stages and detecting termination
//! - The spider contract and the helper passed to fetch callbacks

mod coordinator;
mod fetcher;
mod pool;
mod request;
mod scheduler;
mod scraper;
mod spider;

pub use coordinator::Crawler;
pub use fetcher::{Downloader, ErrorHandler, FetchExecutor, FetchOutcome, FetchTask};
pub use pool::{Completion, Executor, WorkerPool};
pub use request::{Callback, ErrBack, FailedResponse, Job, Request, Response, Target};
pub use scheduler::{JobScheduler, RequestScheduler};
pub use self::scraper::{JobExecutor, Scraper};
pub use spider::{Helper, Spider};

use crate::config::Config;
use crate::http::{DumpingTransport, HttpTransport, Transport};
use crate::spiders::{ForumSpider, SiteSpider};
use crate::storage::DocumentSink;
use crate::TalpaError;
use std::sync::Arc;

/// Assembles a crawler for every configured site and forum
///
/// Builds the HTTP transport (capturing exchanges when a dump directory is
/// configured), then hands over to [`build_crawler_with_transport`].
///
/// # Arguments
///
/// * `config` - The validated configuration
/// * `sink` - Where spiders store page documents
///
/// # Returns
///
/// * `Ok(Crawler)` - A crawler ready to be started
/// * `Err(TalpaError)` - The HTTP client or a component could not be built
pub fn build_crawler(config: &Config, sink: Arc<dyn DocumentSink>) -> Result<Crawler, TalpaError> {
    let http = HttpTransport::new(&config.user_agent, &config.http)?;
    let transport: Arc<dyn Transport> = match &config.output.dump_dir {
        Some(dir) => {
            tracing::info!("Capturing exchanges in {}", dir);
            Arc::new(
                DumpingTransport::new(http, dir)
                    .with_bodies(config.output.dump_bodies)
                    .with_header_fingerprints(config.output.fingerprint_headers),
            )
        }
        None => Arc::new(http),
    };

    build_crawler_with_transport(config, transport, sink)
}

/// Assembles a crawler around an existing transport
pub fn build_crawler_with_transport(
    config: &Config,
    transport: Arc<dyn Transport>,
    sink: Arc<dyn DocumentSink>,
) -> Result<Crawler, TalpaError> {
    let engine = &config.engine;

    let mut spiders: Vec<Box<dyn Spider>> =
        Vec::with_capacity(config.sites.len() + config.forums.len());
    for site in &config.sites {
        let spider = SiteSpider::new(site, Arc::clone(&sink), config.output.fingerprint_headers)?;
        spiders.push(Box::new(spider));
    }
    for forum in &config.forums {
        spiders.push(Box::new(ForumSpider::new(forum, Arc::clone(&sink))?));
    }

    Crawler::new(
        spiders,
        RequestScheduler::new(engine.queue_capacity_hint),
        Downloader::new(engine.downloader_concurrency, transport)?,
        Some(JobScheduler::new(engine.queue_capacity_hint)),
        Some(Scraper::new(engine.scraper_concurrency)?),
    )
}
