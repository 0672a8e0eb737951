//! Spider for forums behind a paginated JSON API
//!
//! A forum is crawled in three rounds:
//! 1. listing pages name the forum's threads
//! 2. the first page of each thread reports how many pages the thread has
//! 3. the remaining pages of the thread are requested together
//!
//! Every request is a signed form POST. Each page turns into one upsert job
//! per entity kind, keyed by the entity's id, so pages fetched twice update
//! documents instead of duplicating them.

mod form;
mod model;

pub use form::{signed_form, SIGN_FIELD};
pub use model::{
    decode, ApiError, ApiPage, ApiStatus, Content, Entity, Forum, PageInfo, Post, PostListPage,
    SubPost, Thread, ThreadListPage, User,
};

use crate::config::ForumEntry;
use crate::crawler::{FailedResponse, Helper, Job, Request, Response, Spider, Target};
use crate::storage::{upsert_job, DocumentSink};
use std::collections::BTreeMap;
use std::sync::Arc;
use url::Url;

/// Spider for one `[[forum]]` entry
pub struct ForumSpider {
    state: Arc<ForumState>,
}

struct ForumState {
    name: String,
    forum: String,
    list_endpoint: Url,
    thread_endpoint: Url,
    list_pages: u32,
    threads_per_page: u32,
    posts_per_page: u32,
    with_sub_posts: bool,
    sign_secret: Option<String>,
    params: BTreeMap<String, String>,
    priority: i32,
    sink: Arc<dyn DocumentSink>,
}

impl ForumSpider {
    /// Creates the spider for a validated forum entry
    pub fn new(entry: &ForumEntry, sink: Arc<dyn DocumentSink>) -> Result<Self, url::ParseError> {
        Ok(Self {
            state: Arc::new(ForumState {
                name: entry.name.clone(),
                forum: entry.forum.clone(),
                list_endpoint: Url::parse(&entry.list_endpoint)?,
                thread_endpoint: Url::parse(&entry.thread_endpoint)?,
                list_pages: entry.list_pages,
                threads_per_page: entry.threads_per_page,
                posts_per_page: entry.posts_per_page,
                with_sub_posts: entry.with_sub_posts,
                sign_secret: entry.sign_secret.clone(),
                params: entry.params.clone(),
                priority: entry.priority,
                sink,
            }),
        })
    }
}

impl Spider for ForumSpider {
    fn name(&self) -> &str {
        &self.state.name
    }

    fn start_requests(&self) -> Vec<Request> {
        (1..=self.state.list_pages)
            .map(|pn| self.state.listing_request(pn))
            .collect()
    }
}

impl ForumState {
    /// Configured parameters plus `fields`, signed
    fn form<const N: usize>(&self, fields: [(&str, String); N]) -> String {
        let mut params = self.params.clone();
        for (key, value) in fields {
            params.insert(key.to_string(), value);
        }
        signed_form(&params, self.sign_secret.as_deref())
    }

    fn listing_request(self: &Arc<Self>, pn: u32) -> Request {
        let body = self.form([
            ("kw", self.forum.clone()),
            ("pn", pn.to_string()),
            ("rn", self.threads_per_page.to_string()),
            ("with_group", "0".to_string()),
        ]);

        let on_page = Arc::clone(self);
        let on_failure = Arc::clone(self);
        Request::new(
            Target::form(self.list_endpoint.clone(), body),
            move |response, helper| on_page.handle_listing(response, helper, pn),
        )
        .with_priority(self.priority)
        .with_errback(move |failed| {
            on_failure.handle_failure(failed, &format!("listing page {}", pn))
        })
    }

    fn thread_request(self: &Arc<Self>, thread_id: &str, pn: u32) -> Request {
        let with_floor = if self.with_sub_posts { "1" } else { "0" };
        let body = self.form([
            ("kz", thread_id.to_string()),
            ("pn", pn.to_string()),
            ("rn", self.posts_per_page.to_string()),
            ("with_floor", with_floor.to_string()),
        ]);

        let on_page = Arc::clone(self);
        let on_failure = Arc::clone(self);
        let page_thread = thread_id.to_string();
        let failed_thread = thread_id.to_string();
        Request::new(
            Target::form(self.thread_endpoint.clone(), body),
            move |response, helper| on_page.handle_thread_page(response, helper, &page_thread, pn),
        )
        .with_priority(self.priority.saturating_add(1))
        .with_errback(move |failed| {
            on_failure.handle_failure(failed, &format!("page {} of thread {}", pn, failed_thread))
        })
    }

    fn handle_listing(self: &Arc<Self>, response: Response, helper: &Helper, pn: u32) {
        let page: ThreadListPage = match decode(&response.body) {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!(spider = %self.name, "Listing page {} unusable: {}", pn, e);
                return;
            }
        };

        let info = page.page;
        let (forum, threads, users) = page.into_entities();
        tracing::info!(
            spider = %self.name,
            "Listing page {}/{} of {} names {} threads",
            info.current_page,
            info.total_page,
            self.forum,
            threads.len()
        );

        let jobs = [
            self.upsert(std::slice::from_ref(&forum)),
            self.upsert(&threads),
            self.upsert(&users),
        ];
        self.put_jobs(helper, jobs.into_iter().flatten());

        let requests: Vec<Request> = threads
            .iter()
            .map(|thread| self.thread_request(&thread.id, 1))
            .collect();
        self.put_requests(helper, requests);
    }

    fn handle_thread_page(
        self: &Arc<Self>,
        response: Response,
        helper: &Helper,
        thread_id: &str,
        pn: u32,
    ) {
        let mut page: PostListPage = match decode(&response.body) {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!(
                    spider = %self.name,
                    "Page {} of thread {} unusable: {}",
                    pn,
                    thread_id,
                    e
                );
                return;
            }
        };
        if page.thread.id.is_empty() {
            page.thread.id = thread_id.to_string();
        }

        let info = page.page;
        let (_, posts, sub_posts, users) = page.into_entities();
        tracing::debug!(
            spider = %self.name,
            "Thread {} page {}/{}: {} posts, {} replies",
            thread_id,
            pn,
            info.total_page,
            posts.len(),
            sub_posts.len()
        );

        let jobs = [
            self.upsert(&posts),
            self.upsert(&sub_posts),
            self.upsert(&users),
        ];
        self.put_jobs(helper, jobs.into_iter().flatten());

        // Only the first page fans out, later pages would repeat it
        if pn != 1 {
            return;
        }
        let total = u32::try_from(info.total_page).unwrap_or(0);
        let rest: Vec<Request> = (2..=total)
            .map(|pn| self.thread_request(thread_id, pn))
            .collect();
        self.put_requests(helper, rest);
    }

    /// One job storing every entity of `items` that has an id
    fn upsert<T: Entity>(&self, items: &[T]) -> Option<Job> {
        let mut docs = Vec::with_capacity(items.len());
        for item in items.iter().filter(|item| !item.key().is_empty()) {
            match item.document() {
                Ok(doc) => docs.push((item.key().to_string(), doc)),
                Err(e) => tracing::warn!(
                    spider = %self.name,
                    "Skipping {} {}: {}",
                    T::COLLECTION,
                    item.key(),
                    e
                ),
            }
        }
        if docs.is_empty() {
            return None;
        }
        Some(upsert_job(Arc::clone(&self.sink), T::COLLECTION, docs))
    }

    fn put_jobs(&self, helper: &Helper, jobs: impl IntoIterator<Item = Job>) {
        if let Err(e) = helper.put_job(jobs) {
            tracing::warn!(spider = %self.name, "Dropping documents: {}", e);
        }
    }

    fn put_requests(&self, helper: &Helper, requests: Vec<Request>) {
        if requests.is_empty() {
            return;
        }
        if let Err(e) = helper.put_request(requests) {
            tracing::warn!(spider = %self.name, "Dropping follow-up pages: {}", e);
        }
    }

    fn handle_failure(&self, failed: FailedResponse, what: &str) {
        tracing::warn!(
            spider = %self.name,
            "{} of {} failed: {}",
            what,
            self.forum,
            failed.error
        );
    }
}
