//! Talpa: a concurrent two-stage crawl engine
//!
//! This crate implements a crawl engine that fetches network resources with one
//! bounded worker pool and processes the derived data with another. Site-specific
//! spiders plug into the engine through seed requests and fetch callbacks.

pub mod config;
pub mod crawler;
pub mod http;
pub mod spiders;
pub mod storage;

use thiserror::Error;

/// Main error type for Talpa operations
#[derive(Debug, Error)]
pub enum TalpaError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Worker pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Job scheduler and scraper must be provided together")]
    MismatchedPipeline,

    #[error("Crawler has already been started")]
    AlreadyStarted,
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Errors reported by the request and job schedulers
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("{scheduler} has been disposed")]
    Disposed { scheduler: &'static str },

    #[error("{scheduler} was already disposed")]
    AlreadyDisposed { scheduler: &'static str },

    #[error("No job scheduler is configured for this crawler")]
    NoJobScheduler,
}

/// Errors reported by the worker pools
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("{pool} concurrency must be a positive integer, got {limit}")]
    InvalidConcurrency { pool: &'static str, limit: usize },

    #[error("{pool} is already open")]
    AlreadyOpen { pool: &'static str },

    #[error("{pool} is not open")]
    NotOpen { pool: &'static str },
}

/// Errors produced while executing a single fetch
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected HTTP status {status}")]
    Status { status: u16 },

    #[error("Capture error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Fetch failed: {0}")]
    Other(String),
}

/// Errors produced by a pool item that did not run to completion
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("Task panicked: {0}")]
    Panicked(String),

    #[error("Task was cancelled")]
    Cancelled,
}

/// Result type alias for Talpa operations
pub type Result<T> = std::result::Result<T, TalpaError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{
    Crawler, Downloader, FailedResponse, Helper, Job, JobScheduler, Request, RequestScheduler,
    Response, Scraper, Spider, Target,
};
pub use http::{HttpTransport, Transport};
pub use storage::{DocumentSink, SqliteSink};
