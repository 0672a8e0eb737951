//! Capture of request/response exchanges on disk
//!
//! Every exchange lands in `<root>/<fingerprint>/`:
//!
//! | File | Contents |
//! |------|----------|
//! | `request` | method, URL, encoded headers |
//! | `request.body` | request body, when present |
//! | `response` | status, final URL, encoded headers |
//! | `response.body` | response body |
//!
//! Body files are only written when body capture is enabled. Responses are
//! captured whatever their status; an exchange that got no answer leaves the
//! request files behind without response files.

use crate::crawler::{Response, Target};
use crate::http::fingerprint::{encode_headers, request_fingerprint};
use crate::http::transport::Transport;
use crate::FetchError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Transport decorator capturing every exchange under a directory
#[derive(Debug)]
pub struct DumpingTransport<T> {
    inner: T,
    root: PathBuf,
    bodies: bool,
    with_headers: bool,
}

impl<T: Transport> DumpingTransport<T> {
    pub fn new(inner: T, root: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            root: root.into(),
            bodies: true,
            with_headers: false,
        }
    }

    /// Enables or disables body files
    pub fn with_bodies(mut self, bodies: bool) -> Self {
        self.bodies = bodies;
        self
    }

    /// Includes headers in the fingerprint naming each capture
    pub fn with_header_fingerprints(mut self, with_headers: bool) -> Self {
        self.with_headers = with_headers;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory a target's exchange is captured in
    pub fn capture_dir(&self, target: &Target) -> PathBuf {
        self.root.join(request_fingerprint(target, self.with_headers))
    }
}

#[async_trait]
impl<T: Transport> Transport for DumpingTransport<T> {
    async fn execute(&self, target: &Target) -> Result<Response, FetchError> {
        let dir = self.capture_dir(target);
        tokio::fs::create_dir_all(&dir).await?;

        tokio::fs::write(dir.join("request"), describe_request(target)).await?;
        if self.bodies {
            if let Some(body) = &target.body {
                tokio::fs::write(dir.join("request.body"), body).await?;
            }
        }

        let response = self.inner.execute(target).await?;

        tokio::fs::write(dir.join("response"), describe_response(&response)).await?;
        if self.bodies {
            tokio::fs::write(dir.join("response.body"), &response.body).await?;
        }

        tracing::trace!("Captured {} {} in {}", target.method, target.url, dir.display());
        Ok(response)
    }
}

fn describe_request(target: &Target) -> String {
    format!(
        "{} {}\n{}",
        target.method,
        target.url,
        encode_headers(&target.headers)
    )
}

fn describe_response(response: &Response) -> String {
    format!(
        "{} {}\n{}",
        response.status.as_u16(),
        response.url,
        encode_headers(&response.headers)
    )
}
