//! Units of work flowing through the engine
//!
//! A [`Request`] pairs an outbound fetch description with the callbacks that
//! consume its outcome. A [`Job`] is an opaque closure produced by those
//! callbacks and run by the scraper.

use crate::crawler::spider::Helper;
use crate::FetchError;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use std::fmt;
use url::Url;

/// Success callback, invoked with the response and the crawler's helper
pub type Callback = Box<dyn FnOnce(Response, &Helper) + Send + 'static>;

/// Error callback, invoked when the fetch fails
pub type ErrBack = Box<dyn FnOnce(FailedResponse) + Send + 'static>;

/// What to fetch: method, URL, headers and optional body
#[derive(Debug, Clone)]
pub struct Target {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

impl Target {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Builds a GET target, rejecting malformed URLs
    pub fn get(url: &str) -> Result<Self, url::ParseError> {
        Ok(Self::new(Method::GET, Url::parse(url)?))
    }

    /// Builds a POST target with a url-encoded form body
    pub fn post_form(url: &str, form: impl Into<String>) -> Result<Self, url::ParseError> {
        Ok(Self::form(Url::parse(url)?, form))
    }

    /// Same as [`Target::post_form`] for an already parsed URL
    pub fn form(url: Url, form: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
            .with_header(
                CONTENT_TYPE,
                HeaderValue::from_static("application/x-www-form-urlencoded"),
            )
            .with_body(form.into().into_bytes())
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }
}

/// An outbound fetch plus its completion callbacks and priority
///
/// The priority only affects pop order in the request scheduler and cannot be
/// changed once the request has been handed to the engine.
pub struct Request {
    target: Target,
    priority: i32,
    callback: Callback,
    errback: Option<ErrBack>,
}

impl Request {
    pub fn new<F>(target: Target, callback: F) -> Self
    where
        F: FnOnce(Response, &Helper) + Send + 'static,
    {
        Self {
            target,
            priority: 0,
            callback: Box::new(callback),
            errback: None,
        }
    }

    /// Shorthand for a GET request
    pub fn get<F>(url: &str, callback: F) -> Result<Self, url::ParseError>
    where
        F: FnOnce(Response, &Helper) + Send + 'static,
    {
        Ok(Self::new(Target::get(url)?, callback))
    }

    /// Higher priorities are fetched first
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Replaces the downloader's default error handler for this request
    pub fn with_errback<F>(mut self, errback: F) -> Self
    where
        F: FnOnce(FailedResponse) + Send + 'static,
    {
        self.errback = Some(Box::new(errback));
        self
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub(crate) fn into_parts(self) -> (Target, Callback, Option<ErrBack>) {
        (self.target, self.callback, self.errback)
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.target.method)
            .field("url", &self.target.url.as_str())
            .field("priority", &self.priority)
            .field("errback", &self.errback.is_some())
            .finish()
    }
}

/// A completed fetch
#[derive(Debug, Clone)]
pub struct Response {
    /// Final URL after redirects
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Response {
    /// Body decoded as UTF-8, replacing invalid sequences
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
    }
}

/// A fetch that did not produce a usable response
#[derive(Debug)]
pub struct FailedResponse {
    pub target: Target,
    pub error: FetchError,
    /// What the server sent back, when it answered with an error status
    pub response: Option<Response>,
}

impl FailedResponse {
    /// A fetch that never got an answer
    pub fn new(target: Target, error: FetchError) -> Self {
        Self {
            target,
            error,
            response: None,
        }
    }

    /// A fetch answered with a non-success status
    pub fn rejected(target: Target, response: Response) -> Self {
        Self {
            target,
            error: FetchError::Status {
                status: response.status.as_u16(),
            },
            response: Some(response),
        }
    }

    /// HTTP status, when the server answered at all
    pub fn status(&self) -> Option<u16> {
        if let Some(response) = &self.response {
            return Some(response.status.as_u16());
        }
        match &self.error {
            FetchError::Status { status } => Some(*status),
            FetchError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// An opaque unit of post-fetch work
pub struct Job(Box<dyn FnOnce() + Send + 'static>);

impl Job {
    pub fn new<F>(work: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self(Box::new(work))
    }

    pub fn run(self) {
        (self.0)()
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Job")
    }
}
