//! Generic spider crawling one configured site
//!
//! Each fetched page becomes a document in the `pages` collection, written by
//! a scraper job. Links are followed breadth-first within the seeds' hosts,
//! up to the configured depth and page budget.

use crate::config::SiteEntry;
use crate::crawler::{FailedResponse, Helper, Request, Response, Spider, Target};
use crate::http::{canonicalize_url, request_fingerprint};
use crate::spiders::parser::{parse_page, ParsedPage};
use crate::storage::{upsert_job, DocumentSink};
use chrono::Utc;
use parking_lot::Mutex;
use reqwest::Method;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use url::Url;

/// Collection receiving one document per fetched page
pub const PAGES_COLLECTION: &str = "pages";

/// Spider for one `[[site]]` entry
pub struct SiteSpider {
    state: Arc<SiteState>,
}

struct SiteState {
    name: String,
    seeds: Vec<Url>,
    hosts: HashSet<String>,
    max_depth: u32,
    max_pages: usize,
    priority: i32,
    fingerprint_headers: bool,
    sink: Arc<dyn DocumentSink>,
    /// Fingerprints of every request issued so far
    issued: Mutex<HashSet<String>>,
}

impl SiteSpider {
    /// Creates the spider for a validated site entry
    ///
    /// # Arguments
    ///
    /// * `site` - The site entry
    /// * `sink` - Where page documents are stored
    /// * `fingerprint_headers` - Whether request identity covers headers
    pub fn new(
        site: &SiteEntry,
        sink: Arc<dyn DocumentSink>,
        fingerprint_headers: bool,
    ) -> Result<Self, url::ParseError> {
        let seeds = site
            .seeds
            .iter()
            .map(|seed| Url::parse(seed))
            .collect::<Result<Vec<_>, _>>()?;
        let hosts = seeds
            .iter()
            .filter_map(|seed| seed.host_str().map(str::to_string))
            .collect();

        Ok(Self {
            state: Arc::new(SiteState {
                name: site.name.clone(),
                seeds,
                hosts,
                max_depth: site.max_depth,
                max_pages: site.max_pages,
                priority: site.priority,
                fingerprint_headers,
                sink,
                issued: Mutex::new(HashSet::new()),
            }),
        })
    }

    /// Number of distinct requests issued so far
    pub fn issued(&self) -> usize {
        self.state.issued.lock().len()
    }
}

impl Spider for SiteSpider {
    fn name(&self) -> &str {
        &self.state.name
    }

    fn start_requests(&self) -> Vec<Request> {
        self.state
            .seeds
            .iter()
            .filter_map(|seed| self.state.request(seed.clone(), 0))
            .collect()
    }
}

impl SiteState {
    /// Builds a request unless it was already issued or the budget is spent
    fn request(self: &Arc<Self>, url: Url, depth: u32) -> Option<Request> {
        let target = Target::new(Method::GET, url);
        let fingerprint = request_fingerprint(&target, self.fingerprint_headers);
        {
            let mut issued = self.issued.lock();
            if issued.len() >= self.max_pages || !issued.insert(fingerprint) {
                return None;
            }
        }

        let on_page = Arc::clone(self);
        let on_failure = Arc::clone(self);
        Some(
            Request::new(target, move |response, helper| {
                on_page.handle_page(response, helper, depth)
            })
            .with_priority(self.priority.saturating_sub(depth as i32))
            .with_errback(move |failed| on_failure.handle_failure(failed, depth)),
        )
    }

    fn handle_page(self: &Arc<Self>, response: Response, helper: &Helper, depth: u32) {
        let is_html = response
            .content_type()
            .map_or(true, |content_type| content_type.contains("html"));
        let page = if is_html {
            parse_page(&response.text(), &response.url)
        } else {
            ParsedPage::default()
        };

        let document = json!({
            "url": response.url.as_str(),
            "site": self.name,
            "title": page.title,
            "status": response.status.as_u16(),
            "content_type": response.content_type(),
            "depth": depth,
            "links": page.links.len(),
            "fetched_at": Utc::now().to_rfc3339(),
        });
        let key = canonicalize_url(&response.url, false).to_string();
        let job = upsert_job(
            Arc::clone(&self.sink),
            PAGES_COLLECTION,
            vec![(key, document)],
        );
        if let Err(e) = helper.put_job(vec![job]) {
            tracing::warn!(spider = %self.name, "Dropping document for {}: {}", response.url, e);
        }

        if depth >= self.max_depth {
            return;
        }

        let follow: Vec<Request> = page
            .links
            .into_iter()
            .filter(|link| link.host_str().map_or(false, |host| self.hosts.contains(host)))
            .filter_map(|link| self.request(link, depth + 1))
            .collect();
        if follow.is_empty() {
            return;
        }

        tracing::debug!(
            spider = %self.name,
            "Following {} links from {}",
            follow.len(),
            response.url
        );
        if let Err(e) = helper.put_request(follow) {
            tracing::warn!(spider = %self.name, "Dropping links from {}: {}", response.url, e);
        }
    }

    fn handle_failure(&self, failed: FailedResponse, depth: u32) {
        tracing::warn!(
            spider = %self.name,
            "{} (depth {}) failed: {}",
            failed.target.url,
            depth,
            failed.error
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::{JobScheduler, RequestScheduler};
    use crate::storage::SqliteSink;
    use crate::FetchError;
    use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
    use reqwest::StatusCode;

    struct Harness {
        requests: Arc<RequestScheduler>,
        jobs: Arc<JobScheduler>,
        helper: Helper,
        sink: Arc<SqliteSink>,
    }

    fn harness() -> Harness {
        let requests = Arc::new(RequestScheduler::new(0));
        let jobs = Arc::new(JobScheduler::new(0));
        Harness {
            helper: Helper::new(Arc::clone(&requests), Some(Arc::clone(&jobs))),
            requests,
            jobs,
            sink: Arc::new(SqliteSink::open_in_memory().unwrap()),
        }
    }

    fn site(max_depth: u32, max_pages: usize) -> SiteEntry {
        SiteEntry {
            name: "example".to_string(),
            seeds: vec!["https://example.com/".to_string()],
            max_depth,
            max_pages,
            priority: 10,
        }
    }

    fn html_response(url: &str, body: &str) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"));
        Response {
            url: Url::parse(url).unwrap(),
            status: StatusCode::OK,
            headers,
            body: body.as_bytes().to_vec(),
        }
    }

    /// Feeds `response` to the callback of `request`
    fn deliver(request: Request, response: Response, helper: &Helper) {
        let (_, callback, _) = request.into_parts();
        callback(response, helper);
    }

    const SEED_PAGE: &str = r#"
        <html><head><title>Home</title></head><body>
            <a href="/a">A</a>
            <a href="/b">B</a>
            <a href="/a#again">A again</a>
            <a href="https://elsewhere.org/">Off site</a>
        </body></html>
    "#;

    #[test]
    fn test_seed_requests() {
        let h = harness();
        let spider = SiteSpider::new(&site(1, 10), h.sink.clone(), false).unwrap();

        let seeds = spider.start_requests();
        assert_eq!(seeds.len(), 1);
        assert_eq!(seeds[0].priority(), 10);
        assert_eq!(spider.name(), "example");

        // Seeds are only issued once
        assert!(spider.start_requests().is_empty());
        assert_eq!(spider.issued(), 1);
    }

    #[test]
    fn test_page_stores_document_and_follows_same_host_links() {
        let h = harness();
        let spider = SiteSpider::new(&site(1, 10), h.sink.clone(), false).unwrap();
        let seed = spider.start_requests().pop().unwrap();

        deliver(seed, html_response("https://example.com/", SEED_PAGE), &h.helper);

        assert_eq!(h.requests.len(), 2);
        let followed = h.requests.get(2).unwrap();
        assert!(followed.iter().all(|r| r.priority() == 9));
        let mut urls: Vec<String> = followed.iter().map(|r| r.target().url.to_string()).collect();
        urls.sort();
        assert_eq!(urls, vec!["https://example.com/a", "https://example.com/b"]);

        assert_eq!(h.jobs.len(), 1);
        for job in h.jobs.get(1).unwrap() {
            job.run();
        }
        let doc = h
            .sink
            .get(PAGES_COLLECTION, "https://example.com/")
            .unwrap()
            .unwrap();
        assert_eq!(doc["title"], "Home");
        assert_eq!(doc["site"], "example");
        assert_eq!(doc["links"], 3);
        assert_eq!(doc["depth"], 0);
        assert_eq!(doc["status"], 200);
    }

    #[test]
    fn test_max_depth_stops_following() {
        let h = harness();
        let spider = SiteSpider::new(&site(0, 10), h.sink.clone(), false).unwrap();
        let seed = spider.start_requests().pop().unwrap();

        deliver(seed, html_response("https://example.com/", SEED_PAGE), &h.helper);

        assert!(h.requests.is_empty());
        assert_eq!(h.jobs.len(), 1);
    }

    #[test]
    fn test_max_pages_caps_requests() {
        let h = harness();
        let spider = SiteSpider::new(&site(3, 2), h.sink.clone(), false).unwrap();
        let seed = spider.start_requests().pop().unwrap();

        deliver(seed, html_response("https://example.com/", SEED_PAGE), &h.helper);

        assert_eq!(h.requests.len(), 1);
        assert_eq!(spider.issued(), 2);
    }

    #[test]
    fn test_already_seen_links_are_skipped() {
        let h = harness();
        let spider = SiteSpider::new(&site(2, 10), h.sink.clone(), false).unwrap();
        let seed = spider.start_requests().pop().unwrap();

        deliver(seed, html_response("https://example.com/", SEED_PAGE), &h.helper);
        let page_a = h
            .requests
            .get(2)
            .unwrap()
            .into_iter()
            .find(|r| r.target().url.path() == "/a")
            .unwrap();

        // Page A links back to the seed and to B, both already issued
        deliver(
            page_a,
            html_response(
                "https://example.com/a",
                r#"<a href="/">Home</a><a href="/b/">B</a><a href="/c">C</a>"#,
            ),
            &h.helper,
        );
        let followed = h.requests.get(10).unwrap();
        assert_eq!(followed.len(), 1);
        assert_eq!(followed[0].target().url.as_str(), "https://example.com/c");
        assert_eq!(followed[0].priority(), 8);
    }

    #[test]
    fn test_non_html_is_stored_without_links() {
        let h = harness();
        let spider = SiteSpider::new(&site(1, 10), h.sink.clone(), false).unwrap();
        let seed = spider.start_requests().pop().unwrap();

        let mut response = html_response("https://example.com/", r#"<a href="/a">A</a>"#);
        response
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/pdf"));
        deliver(seed, response, &h.helper);

        assert!(h.requests.is_empty());
        assert_eq!(h.jobs.len(), 1);
    }

    #[test]
    fn test_failure_is_handled_by_errback() {
        let h = harness();
        let spider = SiteSpider::new(&site(1, 10), h.sink.clone(), false).unwrap();
        let seed = spider.start_requests().pop().unwrap();

        let (target, _, errback) = seed.into_parts();
        let errback = errback.expect("site requests carry an errback");
        errback(FailedResponse::new(
            target,
            FetchError::Other("connection reset".to_string()),
        ));

        assert!(h.requests.is_empty());
        assert!(h.jobs.is_empty());
    }
}
