//! Stable request identity
//!
//! Fingerprints name capture directories and let spiders skip requests they
//! already issued.

use crate::crawler::Target;
use crate::http::normalize::canonicalize_url;
use reqwest::header::HeaderMap;
use sha2::{Digest, Sha256};

/// Encodes headers as `name:value1;value2` lines, sorted by name
pub fn encode_headers(headers: &HeaderMap) -> String {
    let mut names: Vec<_> = headers.keys().collect();
    names.sort_by(|a, b| a.as_str().cmp(b.as_str()));

    let mut encoded = String::new();
    for name in names {
        let values: Vec<String> = headers
            .get_all(name)
            .iter()
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
            .collect();
        encoded.push_str(name.as_str());
        encoded.push(':');
        encoded.push_str(&values.join(";"));
        encoded.push('\n');
    }

    encoded
}

/// Hex SHA-256 over method, canonical URL, body and optionally headers
pub fn request_fingerprint(target: &Target, with_headers: bool) -> String {
    let mut hasher = Sha256::new();
    hasher.update(target.method.as_str().as_bytes());
    hasher.update(b"\n");
    hasher.update(canonicalize_url(&target.url, false).as_str().as_bytes());
    hasher.update(b"\n");
    if let Some(body) = &target.body {
        hasher.update(body);
    }
    if with_headers {
        hasher.update(b"\n");
        hasher.update(encode_headers(&target.headers).as_bytes());
    }

    hex::encode(hasher.finalize())
}
