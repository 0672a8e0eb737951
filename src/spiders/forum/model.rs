//! Payloads of the forum API
//!
//! The API is loose about types: numbers and booleans mostly arrive as
//! strings, timestamps as epoch seconds, and missing values as empty strings.
//! The `lenient_*` deserializers absorb that so the models stay typed.

use chrono::{DateTime, Utc};
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Why a response could not be used as a page
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("malformed payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("API error {code}: {message}")]
    Rejected { code: i64, message: String },
}

/// Something stored as one document, keyed by its id
pub trait Entity: Serialize {
    const COLLECTION: &'static str;

    fn key(&self) -> &str;

    fn document(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

/// A page payload carrying the API status fields
pub trait ApiPage: DeserializeOwned {
    fn status(&self) -> &ApiStatus;
}

/// Decodes a page and rejects it when the API reports an error
pub fn decode<T: ApiPage>(body: &[u8]) -> Result<T, ApiError> {
    let page: T = serde_json::from_slice(body)?;
    page.status().check()?;
    Ok(page)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiStatus {
    #[serde(default, deserialize_with = "lenient_i64")]
    pub error_code: i64,
    #[serde(default, deserialize_with = "lenient_string")]
    pub error_msg: String,
}

impl ApiStatus {
    pub fn check(&self) -> Result<(), ApiError> {
        if self.error_code == 0 {
            return Ok(());
        }
        Err(ApiError::Rejected {
            code: self.error_code,
            message: self.error_msg.clone(),
        })
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageInfo {
    #[serde(default, deserialize_with = "lenient_i64")]
    pub page_size: i64,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub total_page: i64,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub current_page: i64,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub has_more: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Forum {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub avatar: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub first_class: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub second_class: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub slogan: String,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub member_num: i64,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub thread_num: i64,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub post_num: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Thread {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    /// Empty for promoted entries mixed into listings
    #[serde(default, deserialize_with = "lenient_string", skip_serializing)]
    pub tid: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,
    /// Includes replies to posts, so it cannot be used to count pages
    #[serde(default, deserialize_with = "lenient_i64")]
    pub reply_num: i64,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub create_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub author_id: String,
    #[serde(
        default,
        rename(deserialize = "last_time_int"),
        deserialize_with = "lenient_timestamp"
    )]
    pub last_time: Option<DateTime<Utc>>,
    /// Absent when the API reports `NAN` or `INF`
    #[serde(default, deserialize_with = "lenient_count")]
    pub view_num: Option<i64>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_top: bool,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_good: bool,
    #[serde(default)]
    pub forum_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct User {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(
        default,
        rename(deserialize = "name_show"),
        deserialize_with = "lenient_string"
    )]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub portrait: String,
}

/// One fragment of a post body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Content {
    #[serde(rename = "type", default, deserialize_with = "lenient_string")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub link: String,
    #[serde(
        default,
        rename(deserialize = "origin_src"),
        skip_serializing_if = "String::is_empty"
    )]
    pub image: String,
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "String::is_empty"
    )]
    pub uid: String,
}

impl Content {
    /// Readable text of the fragment: plain text and links, nothing for media
    pub fn plain_text(&self) -> &str {
        match self.kind.as_str() {
            "0" => &self.text,
            "1" => &self.link,
            _ => "",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Post {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub author_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub floor: i64,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub content: Vec<Content>,
    #[serde(default)]
    pub thread_id: String,
    #[serde(
        default,
        rename(deserialize = "sub_post_list"),
        deserialize_with = "sub_post_list",
        skip_serializing
    )]
    pub sub_posts: Vec<SubPost>,
}

impl Post {
    pub fn text(&self) -> String {
        self.content.iter().map(Content::plain_text).collect()
    }
}

/// A reply attached to a post
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubPost {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub author_id: String,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub floor: i64,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub content: Vec<Content>,
    #[serde(default)]
    pub post_id: String,
}

impl SubPost {
    pub fn text(&self) -> String {
        self.content.iter().map(Content::plain_text).collect()
    }
}

/// A page of the forum's thread listing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ThreadListPage {
    #[serde(default)]
    pub forum: Forum,
    #[serde(default)]
    pub page: PageInfo,
    #[serde(default)]
    pub thread_list: Vec<Thread>,
    #[serde(default)]
    pub user_list: Vec<User>,
    #[serde(flatten)]
    pub status: ApiStatus,
}

impl ApiPage for ThreadListPage {
    fn status(&self) -> &ApiStatus {
        &self.status
    }
}

impl ThreadListPage {
    /// Splits the page into entities, dropping promoted entries and tagging
    /// threads with their forum
    pub fn into_entities(self) -> (Forum, Vec<Thread>, Vec<User>) {
        let forum = self.forum;
        let threads = self
            .thread_list
            .into_iter()
            .filter(|thread| !thread.tid.is_empty() && !thread.id.is_empty())
            .map(|thread| Thread {
                forum_id: forum.id.clone(),
                ..thread
            })
            .collect();
        (forum, threads, self.user_list)
    }
}

/// A page of one thread
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostListPage {
    #[serde(default)]
    pub forum: Forum,
    #[serde(default)]
    pub thread: Thread,
    #[serde(default)]
    pub page: PageInfo,
    #[serde(default)]
    pub post_list: Vec<Post>,
    #[serde(default)]
    pub user_list: Vec<User>,
    #[serde(flatten)]
    pub status: ApiStatus,
}

impl ApiPage for PostListPage {
    fn status(&self) -> &ApiStatus {
        &self.status
    }
}

impl PostListPage {
    /// Splits the page into entities, linking posts to the thread and
    /// replies to their post
    pub fn into_entities(self) -> (Thread, Vec<Post>, Vec<SubPost>, Vec<User>) {
        let thread = self.thread;
        let mut posts = Vec::with_capacity(self.post_list.len());
        let mut sub_posts = Vec::new();
        for mut post in self.post_list {
            post.thread_id = thread.id.clone();
            for mut sub_post in std::mem::take(&mut post.sub_posts) {
                sub_post.post_id = post.id.clone();
                sub_posts.push(sub_post);
            }
            posts.push(post);
        }
        (thread, posts, sub_posts, self.user_list)
    }
}

impl Entity for Forum {
    const COLLECTION: &'static str = "forums";

    fn key(&self) -> &str {
        &self.id
    }
}

impl Entity for Thread {
    const COLLECTION: &'static str = "threads";

    fn key(&self) -> &str {
        &self.id
    }
}

impl Entity for User {
    const COLLECTION: &'static str = "users";

    fn key(&self) -> &str {
        &self.id
    }
}

impl Entity for Post {
    const COLLECTION: &'static str = "posts";

    fn key(&self) -> &str {
        &self.id
    }

    fn document(&self) -> serde_json::Result<Value> {
        with_text(serde_json::to_value(self)?, self.text())
    }
}

impl Entity for SubPost {
    const COLLECTION: &'static str = "sub_posts";

    fn key(&self) -> &str {
        &self.id
    }

    fn document(&self) -> serde_json::Result<Value> {
        with_text(serde_json::to_value(self)?, self.text())
    }
}

fn with_text(mut document: Value, text: String) -> serde_json::Result<Value> {
    if let Value::Object(fields) = &mut document {
        fields.insert("text".to_string(), Value::String(text));
    }
    Ok(document)
}

/// Any scalar the API may use in place of a typed value
#[derive(Deserialize)]
#[serde(untagged)]
enum Loose {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    Null,
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Loose::deserialize(deserializer)? {
        Loose::Int(n) => n.to_string(),
        Loose::Float(f) => f.to_string(),
        Loose::Bool(b) => b.to_string(),
        Loose::Text(s) => s,
        Loose::Null => String::new(),
    })
}

fn lenient_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    match Loose::deserialize(deserializer)? {
        Loose::Int(n) => Ok(n),
        Loose::Float(f) => Ok(f as i64),
        Loose::Bool(b) => Ok(i64::from(b)),
        Loose::Null => Ok(0),
        Loose::Text(s) => {
            let s = s.trim();
            if s.is_empty() {
                return Ok(0);
            }
            s.parse().map_err(de::Error::custom)
        }
    }
}

fn lenient_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    match Loose::deserialize(deserializer)? {
        Loose::Int(n) => Ok(Some(n)),
        Loose::Float(f) if f.is_finite() => Ok(Some(f as i64)),
        Loose::Text(s) => {
            let s = s.trim();
            if s.is_empty() || s.eq_ignore_ascii_case("nan") || s.eq_ignore_ascii_case("inf") {
                return Ok(None);
            }
            s.parse().map(Some).map_err(de::Error::custom)
        }
        _ => Ok(None),
    }
}

fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    match Loose::deserialize(deserializer)? {
        Loose::Int(n) => Ok(n != 0),
        Loose::Float(f) => Ok(f != 0.0),
        Loose::Bool(b) => Ok(b),
        Loose::Null => Ok(false),
        Loose::Text(s) => match s.trim() {
            "" | "0" | "false" => Ok(false),
            "1" | "true" => Ok(true),
            other => Err(de::Error::custom(format!("invalid boolean '{}'", other))),
        },
    }
}

fn lenient_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    let seconds = lenient_i64(deserializer)?;
    if seconds <= 0 {
        return Ok(None);
    }
    DateTime::from_timestamp(seconds, 0)
        .map(Some)
        .ok_or_else(|| de::Error::custom(format!("timestamp {} out of range", seconds)))
}

/// Replies arrive either as a list or wrapped in an object carrying the list
fn sub_post_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<SubPost>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum SubPostList {
        Flat(Vec<SubPost>),
        Nested {
            #[serde(default)]
            sub_post_list: Vec<SubPost>,
        },
    }

    Ok(match Option::<SubPostList>::deserialize(deserializer)? {
        Some(SubPostList::Flat(list)) => list,
        Some(SubPostList::Nested { sub_post_list }) => sub_post_list,
        None => Vec::new(),
    })
}
