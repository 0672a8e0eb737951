//! Spiders shipped with the binary
//!
//! [`SiteSpider`] crawls one configured site and stores a document per page.
//! [`ForumSpider`] walks a forum's JSON API and stores forums, threads, posts,
//! replies and users.
//! Library users write their own [`Spider`](crate::Spider) implementations.

mod forum;
mod parser;
mod site;

pub use forum::ForumSpider;
pub use parser::{parse_page, ParsedPage};
pub use site::{SiteSpider, PAGES_COLLECTION};
