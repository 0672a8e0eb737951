//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and test
//! the full crawl cycle end-to-end.

use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use talpa::config::{load_config, Config, HttpConfig, UserAgentConfig};
use talpa::crawler::{build_crawler, Crawler, Downloader, JobScheduler, Scraper};
use talpa::http::{request_fingerprint, DumpingTransport, HttpTransport, Transport};
use talpa::spiders::PAGES_COLLECTION;
use talpa::storage::{upsert_job, DocumentSink, SqliteSink};
use talpa::{Request, RequestScheduler, Spider, Target};
use tempfile::TempDir;
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn user_agent() -> UserAgentConfig {
    UserAgentConfig {
        crawler_name: "TestBot".to_string(),
        crawler_version: "1.0.0".to_string(),
        contact_url: "https://example.com/contact".to_string(),
        contact_email: "test@example.com".to_string(),
    }
}

fn http_transport() -> HttpTransport {
    let http = HttpConfig {
        timeout_secs: 5,
        connect_timeout_secs: 2,
    };
    HttpTransport::new(&user_agent(), &http).expect("Failed to build transport")
}

/// Writes a configuration file for one site and loads it back
fn write_config(dir: &Path, seed: &str, max_depth: u32, extra_output: &str) -> Config {
    let db_path = dir.join("talpa.db");
    let contents = format!(
        r#"
[engine]
downloader-concurrency = 2
scraper-concurrency = 2

[user-agent]
crawler-name = "TestBot"
crawler-version = "1.0.0"
contact-url = "https://example.com/contact"
contact-email = "test@example.com"

[http]
timeout-secs = 5

[output]
database-path = "{}"
{}

[[site]]
name = "mock"
seeds = ["{}"]
max-depth = {}
max-pages = 50
"#,
        db_path.display(),
        extra_output,
        seed,
        max_depth
    );

    let config_path = dir.join("talpa.toml");
    std::fs::write(&config_path, contents).expect("Failed to write config");
    load_config(&config_path).expect("Failed to load config")
}

async fn mount_html(server: &MockServer, route: &str, html: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(html, "text/html"),
        )
        .mount(server)
        .await;
}

async fn run_to_completion(crawler: &Crawler) {
    crawler.start().expect("Failed to start crawler");
    tokio::time::timeout(Duration::from_secs(10), crawler.wait())
        .await
        .expect("Crawl did not terminate");
    assert!(crawler.is_closed());
}

#[tokio::test]
async fn test_full_crawl_single_site() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_html(
        &mock_server,
        "/",
        format!(
            r#"<html><head><title>Home</title></head><body>
            <a href="{}/page1">Page 1</a>
            <a href="/page2">Page 2</a>
            <a href="https://elsewhere.invalid/">Off site</a>
            </body></html>"#,
            base_url
        ),
    )
    .await;
    mount_html(
        &mock_server,
        "/page1",
        r#"<html><head><title>Page 1</title></head><body><a href="/">Home</a></body></html>"#
            .to_string(),
    )
    .await;
    mount_html(
        &mock_server,
        "/page2",
        r#"<html><head><title>Page 2</title></head><body>Content 2</body></html>"#.to_string(),
    )
    .await;

    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path(), &format!("{}/", base_url), 1, "");
    let sink = Arc::new(SqliteSink::open(Path::new(&config.output.database_path)).unwrap());

    let crawler = build_crawler(&config, sink.clone()).expect("Failed to build crawler");
    run_to_completion(&crawler).await;

    assert_eq!(sink.count(PAGES_COLLECTION).unwrap(), 3);
    let page1 = sink
        .get(PAGES_COLLECTION, &format!("{}/page1", base_url))
        .unwrap()
        .expect("page1 should be stored");
    assert_eq!(page1["title"], "Page 1");
    assert_eq!(page1["depth"], 1);
    assert_eq!(page1["site"], "mock");

    // Home was not fetched twice, and the off-site link was never followed
    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);
}

#[tokio::test]
async fn test_crawl_with_depth_limit() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_html(&mock_server, "/", r#"<a href="/level1">1</a>"#.to_string()).await;
    mount_html(&mock_server, "/level1", r#"<a href="/level2">2</a>"#.to_string()).await;
    mount_html(&mock_server, "/level2", "<p>too deep</p>".to_string()).await;

    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path(), &format!("{}/", base_url), 1, "");
    let sink = Arc::new(SqliteSink::open(Path::new(&config.output.database_path)).unwrap());

    let crawler = build_crawler(&config, sink.clone()).unwrap();
    run_to_completion(&crawler).await;

    assert_eq!(sink.count(PAGES_COLLECTION).unwrap(), 2);
    assert!(sink
        .get(PAGES_COLLECTION, &format!("{}/level2", base_url))
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_error_status_routes_to_errback_and_is_captured() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such page"))
        .mount(&mock_server)
        .await;

    struct MissingPage {
        url: String,
        failures: Arc<Mutex<Vec<(Option<u16>, Option<String>)>>>,
    }

    impl Spider for MissingPage {
        fn name(&self) -> &str {
            "missing"
        }

        fn start_requests(&self) -> Vec<Request> {
            let failures = Arc::clone(&self.failures);
            vec![Request::get(&self.url, |_, _| panic!("404 must not reach the callback"))
                .unwrap()
                .with_errback(move |failed| {
                    let body = failed.response.as_ref().map(|response| response.text());
                    failures.lock().push((failed.status(), body));
                })]
        }
    }

    let temp = TempDir::new().unwrap();
    let dumps = temp.path().join("dumps");
    let url = format!("{}/missing", mock_server.uri());
    let failures = Arc::new(Mutex::new(Vec::new()));
    let crawler = Crawler::new(
        vec![Box::new(MissingPage {
            url: url.clone(),
            failures: Arc::clone(&failures),
        })],
        RequestScheduler::new(0),
        Downloader::new(1, Arc::new(DumpingTransport::new(http_transport(), &dumps))).unwrap(),
        None,
        None,
    )
    .unwrap();
    run_to_completion(&crawler).await;

    assert_eq!(
        *failures.lock(),
        vec![(Some(404), Some("no such page".to_string()))]
    );

    let capture = dumps.join(request_fingerprint(&Target::get(&url).unwrap(), false));
    assert!(std::fs::read_to_string(capture.join("response"))
        .unwrap()
        .starts_with("404 "));
    assert_eq!(
        std::fs::read_to_string(capture.join("response.body")).unwrap(),
        "no such page"
    );
}

#[tokio::test]
async fn test_form_post_and_user_agent() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .and(body_string("kw=mole&pn=1"))
        .and(header(
            "user-agent",
            "TestBot/1.0.0 (+https://example.com/contact; test@example.com)",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"hits": 2}"#))
        .expect(1)
        .mount(&mock_server)
        .await;

    struct SearchSpider {
        url: String,
        sink: Arc<dyn DocumentSink>,
    }

    impl Spider for SearchSpider {
        fn name(&self) -> &str {
            "search"
        }

        fn start_requests(&self) -> Vec<Request> {
            let sink = Arc::clone(&self.sink);
            let target = Target::post_form(&self.url, "kw=mole&pn=1").unwrap();
            vec![Request::new(target, move |response, helper| {
                let body: serde_json::Value = response.json().unwrap();
                helper
                    .put_job(vec![upsert_job(
                        sink,
                        "searches",
                        vec![("mole".to_string(), body)],
                    )])
                    .unwrap();
            })]
        }
    }

    let sink = Arc::new(SqliteSink::open_in_memory().unwrap());
    let crawler = Crawler::new(
        vec![Box::new(SearchSpider {
            url: format!("{}/search", mock_server.uri()),
            sink: sink.clone(),
        })],
        RequestScheduler::new(0),
        Downloader::new(1, Arc::new(http_transport())).unwrap(),
        Some(JobScheduler::new(0)),
        Some(Scraper::new(1).unwrap()),
    )
    .unwrap();
    run_to_completion(&crawler).await;

    let stored = sink.get("searches", "mole").unwrap().unwrap();
    assert_eq!(stored["hits"], 2);
}

#[tokio::test]
async fn test_dumping_transport_captures_exchange() {
    let mock_server = MockServer::start().await;
    mount_html(&mock_server, "/", "<title>Captured</title>".to_string()).await;

    let temp = TempDir::new().unwrap();
    let transport = DumpingTransport::new(http_transport(), temp.path().join("dumps"));
    let target = Target::get(&format!("{}/", mock_server.uri())).unwrap();

    let response = transport.execute(&target).await.unwrap();
    assert_eq!(response.status.as_u16(), 200);

    let dir = temp
        .path()
        .join("dumps")
        .join(request_fingerprint(&target, false));
    assert!(std::fs::read_to_string(dir.join("request"))
        .unwrap()
        .starts_with("GET "));
    assert!(std::fs::read_to_string(dir.join("response"))
        .unwrap()
        .contains("content-type:text/html"));
    assert_eq!(
        std::fs::read_to_string(dir.join("response.body")).unwrap(),
        "<title>Captured</title>"
    );
}

#[tokio::test]
async fn test_configured_dump_dir_is_used() {
    let mock_server = MockServer::start().await;
    mount_html(&mock_server, "/", "<title>Only page</title>".to_string()).await;

    let temp = TempDir::new().unwrap();
    let dump_dir = temp.path().join("dumps");
    let config = write_config(
        temp.path(),
        &format!("{}/", mock_server.uri()),
        0,
        &format!("dump-dir = \"{}\"\ndump-bodies = false", dump_dir.display()),
    );
    let sink = Arc::new(SqliteSink::open(Path::new(&config.output.database_path)).unwrap());

    let crawler = build_crawler(&config, sink.clone()).unwrap();
    run_to_completion(&crawler).await;

    let captures: Vec<_> = std::fs::read_dir(&dump_dir).unwrap().collect();
    assert_eq!(captures.len(), 1);
    let capture = captures[0].as_ref().unwrap().path();
    assert!(capture.join("response").exists());
    assert!(!capture.join("response.body").exists());
    assert_eq!(sink.count(PAGES_COLLECTION).unwrap(), 1);
}

#[tokio::test]
async fn test_stop_interrupts_slow_crawl() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(200)))
        .mount(&mock_server)
        .await;

    struct ManyPages {
        base: String,
    }

    impl Spider for ManyPages {
        fn name(&self) -> &str {
            "many"
        }

        fn start_requests(&self) -> Vec<Request> {
            (0..50)
                .map(|i| Request::get(&format!("{}/{}", self.base, i), |_, _| {}).unwrap())
                .collect()
        }
    }

    let crawler = Crawler::new(
        vec![Box::new(ManyPages {
            base: mock_server.uri(),
        })],
        RequestScheduler::new(64),
        Downloader::new(2, Arc::new(http_transport())).unwrap(),
        None,
        None,
    )
    .unwrap();

    crawler.start().unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    tokio::time::timeout(Duration::from_secs(5), crawler.stop())
        .await
        .expect("stop did not return");

    assert!(crawler.is_closed());
    assert!(crawler.requests().is_disposed());
    let fetched = mock_server.received_requests().await.unwrap().len();
    assert!(fetched < 50, "fetched {} pages after stop", fetched);
}
