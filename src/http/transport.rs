//! reqwest-backed transport
//!
//! Builds the HTTP client from the user agent and timeout configuration.
//! Every answer is returned as a [`Response`] whatever its status; only
//! transport failures (DNS, connect, timeout, body read) become
//! `FetchError::Transport`. Deciding which statuses count as failures is left
//! to the downloader.

use crate::config::{HttpConfig, UserAgentConfig};
use crate::crawler::{Response, Target};
use crate::FetchError;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Executes fetch targets on behalf of the downloader
///
/// Implementations return error statuses as responses and reserve `Err` for
/// exchanges that produced no answer.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, target: &Target) -> Result<Response, FetchError>;
}

/// Formats the user agent as `Name/Version (+ContactURL; ContactEmail)`
pub fn format_user_agent(config: &UserAgentConfig) -> String {
    format!(
        "{}/{} (+{}; {})",
        config.crawler_name, config.crawler_version, config.contact_url, config.contact_email
    )
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `user_agent` - The user agent configuration
/// * `http` - Request and connect timeouts
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use talpa::config::{HttpConfig, UserAgentConfig};
/// use talpa::http::build_http_client;
///
/// let config = UserAgentConfig {
///     crawler_name: "talpa".to_string(),
///     crawler_version: "0.1".to_string(),
///     contact_url: "https://example.com/bot".to_string(),
///     contact_email: "bot@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config, &HttpConfig::default()).unwrap();
/// ```
pub fn build_http_client(
    user_agent: &UserAgentConfig,
    http: &HttpConfig,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(format_user_agent(user_agent))
        .timeout(Duration::from_secs(http.timeout_secs))
        .connect_timeout(Duration::from_secs(http.connect_timeout_secs))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Transport performing real HTTP requests
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(user_agent: &UserAgentConfig, http: &HttpConfig) -> Result<Self, reqwest::Error> {
        Ok(Self::with_client(build_http_client(user_agent, http)?))
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, target: &Target) -> Result<Response, FetchError> {
        let mut builder = self
            .client
            .request(target.method.clone(), target.url.clone())
            .headers(target.headers.clone());
        if let Some(body) = &target.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status();
        let url = response.url().clone();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        Ok(Response {
            url,
            status,
            headers,
            body,
        })
    }
}
