use serde::Deserialize;
use std::collections::BTreeMap;

/// Main configuration structure for Talpa
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub engine: EngineConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub http: HttpConfig,
    pub output: OutputConfig,
    #[serde(default, rename = "site")]
    pub sites: Vec<SiteEntry>,
    #[serde(default, rename = "forum")]
    pub forums: Vec<ForumEntry>,
}

/// Engine concurrency configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Number of concurrent fetch workers
    #[serde(rename = "downloader-concurrency")]
    pub downloader_concurrency: usize,

    /// Number of concurrent job workers
    #[serde(rename = "scraper-concurrency")]
    pub scraper_concurrency: usize,

    /// Initial capacity of the request and job queues
    #[serde(rename = "queue-capacity-hint", default = "default_queue_capacity_hint")]
    pub queue_capacity_hint: usize,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

/// HTTP client timeouts
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Total request timeout (seconds)
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Connection establishment timeout (seconds)
    #[serde(rename = "connect-timeout-secs", default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite document database
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Directory receiving request/response captures, disabled when absent
    #[serde(rename = "dump-dir", default)]
    pub dump_dir: Option<String>,

    /// Whether captures include bodies
    #[serde(rename = "dump-bodies", default = "default_true")]
    pub dump_bodies: bool,

    /// Whether request fingerprints cover headers
    #[serde(rename = "fingerprint-headers", default)]
    pub fingerprint_headers: bool,
}

/// A site to crawl, one spider per entry
#[derive(Debug, Clone, Deserialize)]
pub struct SiteEntry {
    /// Identifier used in logs and stored documents
    pub name: String,

    /// Seed URLs
    pub seeds: Vec<String>,

    /// Maximum link depth followed from a seed
    #[serde(rename = "max-depth", default = "default_max_depth")]
    pub max_depth: u32,

    /// Maximum number of requests issued for this site
    #[serde(rename = "max-pages", default = "default_max_pages")]
    pub max_pages: usize,

    /// Priority of seed requests
    #[serde(default)]
    pub priority: i32,
}

/// A forum reached through its paginated JSON API
///
/// Listing pages are fetched from `list-endpoint`; every listed thread is then
/// read page by page from `thread-endpoint`. Both take url-encoded form posts.
#[derive(Debug, Clone, Deserialize)]
pub struct ForumEntry {
    /// Identifier used in logs
    pub name: String,

    /// Forum identifier sent to the API
    pub forum: String,

    #[serde(rename = "list-endpoint")]
    pub list_endpoint: String,

    #[serde(rename = "thread-endpoint")]
    pub thread_endpoint: String,

    /// Number of listing pages requested, starting from the first
    #[serde(rename = "list-pages", default = "default_list_pages")]
    pub list_pages: u32,

    /// Page size of listing requests
    #[serde(rename = "threads-per-page", default = "default_threads_per_page")]
    pub threads_per_page: u32,

    /// Page size of thread requests
    #[serde(rename = "posts-per-page", default = "default_posts_per_page")]
    pub posts_per_page: u32,

    /// Whether thread pages embed replies to posts
    #[serde(rename = "with-sub-posts", default = "default_true")]
    pub with_sub_posts: bool,

    /// Secret appended when signing form bodies; unsigned when absent
    #[serde(rename = "sign-secret", default)]
    pub sign_secret: Option<String>,

    /// Extra form parameters sent with every request
    #[serde(default)]
    pub params: BTreeMap<String, String>,

    /// Priority of listing requests; thread pages get one more
    #[serde(default)]
    pub priority: i32,
}

fn default_queue_capacity_hint() -> usize {
    64
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_max_depth() -> u32 {
    1
}

fn default_max_pages() -> usize {
    100
}

fn default_list_pages() -> u32 {
    1
}

fn default_threads_per_page() -> u32 {
    10
}

fn default_posts_per_page() -> u32 {
    30
}
