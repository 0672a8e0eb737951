//! Integration tests for the forum spider
//!
//! A wiremock server plays the forum API; the crawl runs from a configuration
//! file through to the SQLite document store.

use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use talpa::config::{load_config, Config};
use talpa::crawler::build_crawler;
use talpa::storage::{DocumentSink, SqliteSink};
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LIST_PATH: &str = "/c/f/frs/page";
const THREAD_PATH: &str = "/c/f/pb/page";

/// Writes a configuration with a single forum and loads it back
fn write_config(dir: &Path, base_url: &str, list_pages: u32) -> Config {
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

[output]
database-path = "{db}"

[[forum]]
name = "mock-forum"
forum = "rust"
list-endpoint = "{base}{list}"
thread-endpoint = "{base}{thread}"
list-pages = {list_pages}
posts-per-page = 2
sign-secret = "s3cret"

[forum.params]
_client_type = "2"
"#,
        db = dir.join("talpa.db").display(),
        base = base_url,
        list = LIST_PATH,
        thread = THREAD_PATH,
        list_pages = list_pages,
    );

    let config_path = dir.join("talpa.toml");
    std::fs::write(&config_path, contents).expect("Failed to write config");
    load_config(&config_path).expect("Failed to load config")
}

async fn mount_api(server: &MockServer, route: &str, fields: &[&str], body: Value) {
    let mut mock = Mock::given(method("POST"))
        .and(path(route))
        .and(body_string_contains("_client_type=2"))
        .and(body_string_contains("sign="));
    for field in fields {
        mock = mock.and(body_string_contains(*field));
    }
    mock.respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

fn post(id: &str, floor: u32, text: &str) -> Value {
    json!({
        "id": id,
        "author_id": "7",
        "floor": floor.to_string(),
        "time": "1488468355",
        "content": [{"type": "0", "text": text}],
        "sub_post_list": []
    })
}

async fn mount_forum(server: &MockServer) {
    mount_api(
        server,
        LIST_PATH,
        &["kw=rust", "pn=1&", "rn=10"],
        json!({
            "error_code": "0",
            "forum": {"id": "52", "name": "rust", "member_num": "1200"},
            "page": {"total_page": "2", "current_page": "1", "has_more": "1"},
            "thread_list": [
                {"id": "101", "tid": "101", "title": "Ownership", "author_id": "7", "view_num": "NAN"},
                {"id": "102", "tid": "102", "title": "Lifetimes", "author_id": "8"},
                {"id": "900", "title": "Sponsored"}
            ],
            "user_list": [{"id": "7", "name_show": "ferris"}, {"id": "8", "name_show": "crab"}]
        }),
    )
    .await;

    // The second listing page is refused by the API itself
    mount_api(
        server,
        LIST_PATH,
        &["kw=rust", "pn=2&"],
        json!({"error_code": "110001", "error_msg": "too many requests"}),
    )
    .await;

    let mut first = post("1002", 2, "Moves, borrows");
    first["sub_post_list"] = json!({
        "pid": "1002",
        "sub_post_list": [{"id": "5001", "author_id": "8", "content": [{"type": "0", "text": "thanks"}]}]
    });
    mount_api(
        server,
        THREAD_PATH,
        &["kz=101&", "pn=1&", "rn=2", "with_floor=1"],
        json!({
            "error_code": 0,
            "thread": {"id": "101", "title": "Ownership"},
            "page": {"total_page": "2", "current_page": "1"},
            "post_list": [post("1001", 1, "Who owns this?"), first],
            "user_list": [{"id": "7", "name_show": "ferris"}]
        }),
    )
    .await;
    mount_api(
        server,
        THREAD_PATH,
        &["kz=101&", "pn=2&"],
        json!({
            "error_code": 0,
            "thread": {"id": "101"},
            "page": {"total_page": "2", "current_page": "2"},
            "post_list": [post("1003", 3, "Solved")],
            "user_list": []
        }),
    )
    .await;
    mount_api(
        server,
        THREAD_PATH,
        &["kz=102&", "pn=1&"],
        json!({
            "error_code": "0",
            "thread": {"id": "102"},
            "page": {"total_page": "1", "current_page": "1"},
            "post_list": [post("2001", 1, "'a everywhere")],
            "user_list": [{"id": "8", "name_show": "crab"}]
        }),
    )
    .await;
}

#[tokio::test]
async fn test_forum_crawl_follows_threads_and_pages() {
    let mock_server = MockServer::start().await;
    mount_forum(&mock_server).await;

    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path(), &mock_server.uri(), 2);
    let sink = Arc::new(SqliteSink::open(Path::new(&config.output.database_path)).unwrap());

    let crawler = build_crawler(&config, sink.clone()).expect("Failed to build crawler");
    crawler.start().expect("Failed to start crawler");
    tokio::time::timeout(Duration::from_secs(10), crawler.wait())
        .await
        .expect("Crawl did not terminate");
    assert!(crawler.is_closed());

    // Two listing pages, two first thread pages, one second page
    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 5);
    assert!(requests.iter().all(|r| r.method.to_string() == "POST"));

    assert_eq!(sink.count("forums").unwrap(), 1);
    assert_eq!(sink.count("threads").unwrap(), 2);
    assert_eq!(sink.count("posts").unwrap(), 4);
    assert_eq!(sink.count("sub_posts").unwrap(), 1);
    assert_eq!(sink.count("users").unwrap(), 2);
    assert!(sink.get("threads", "900").unwrap().is_none());

    let forum = sink.get("forums", "52").unwrap().unwrap();
    assert_eq!(forum["member_num"], 1200);
    let thread = sink.get("threads", "101").unwrap().unwrap();
    assert_eq!(thread["forum_id"], "52");
    assert!(thread["view_num"].is_null());
    let last = sink.get("posts", "1003").unwrap().unwrap();
    assert_eq!(last["thread_id"], "101");
    assert_eq!(last["floor"], 3);
    assert_eq!(last["text"], "Solved");
    let reply = sink.get("sub_posts", "5001").unwrap().unwrap();
    assert_eq!(reply["post_id"], "1002");
}

#[tokio::test]
async fn test_forum_recrawl_updates_in_place() {
    let mock_server = MockServer::start().await;
    mount_forum(&mock_server).await;

    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path(), &mock_server.uri(), 1);
    let sink = Arc::new(SqliteSink::open(Path::new(&config.output.database_path)).unwrap());

    for _ in 0..2 {
        let crawler = build_crawler(&config, sink.clone()).unwrap();
        crawler.start().unwrap();
        tokio::time::timeout(Duration::from_secs(10), crawler.wait())
            .await
            .expect("Crawl did not terminate");
    }

    assert_eq!(mock_server.received_requests().await.unwrap().len(), 8);
    assert_eq!(sink.count("threads").unwrap(), 2);
    assert_eq!(sink.count("posts").unwrap(), 4);
    assert_eq!(sink.count("users").unwrap(), 2);
}
