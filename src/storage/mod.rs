//! Storage module for persisting crawl results
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - Keyed JSON document upserts grouped by collection
//! - Wrapping upserts as scraper jobs

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteSink;
pub use traits::{DocumentSink, StorageError, StorageResult, UpsertSummary};

use crate::crawler::Job;
use serde_json::Value;
use std::sync::Arc;

/// Wraps a batch upsert into a job for the scraper
///
/// The job logs the outcome; a storage failure does not abort the crawl.
pub fn upsert_job(
    sink: Arc<dyn DocumentSink>,
    collection: impl Into<String>,
    docs: Vec<(String, Value)>,
) -> Job {
    let collection = collection.into();
    Job::new(move || match sink.upsert_batch(&collection, &docs) {
        Ok(summary) => tracing::debug!(
            "Upserted into {}: {} inserted, {} updated",
            collection,
            summary.inserted,
            summary.updated
        ),
        Err(e) => tracing::error!(
            "Failed to upsert {} documents into {}: {}",
            docs.len(),
            collection,
            e
        ),
    })
}
