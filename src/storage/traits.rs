//! Storage traits and error types
//!
//! Jobs persist what spiders extract through a [`DocumentSink`]: a store of
//! JSON documents grouped in named collections and addressed by key.

use serde_json::Value;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Outcome of a batch upsert
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    pub inserted: usize,
    pub updated: usize,
}

impl UpsertSummary {
    pub fn total(&self) -> usize {
        self.inserted + self.updated
    }
}

/// Keyed document store shared by all jobs of a crawl
pub trait DocumentSink: Send + Sync {
    /// Inserts or replaces documents, all or nothing
    ///
    /// # Arguments
    ///
    /// * `collection` - Collection the documents belong to
    /// * `docs` - `(key, document)` pairs; a key repeated within the batch
    ///   counts as an update
    fn upsert_batch(&self, collection: &str, docs: &[(String, Value)])
        -> StorageResult<UpsertSummary>;

    /// Fetches one document
    fn get(&self, collection: &str, key: &str) -> StorageResult<Option<Value>>;

    /// Number of documents in a collection
    fn count(&self, collection: &str) -> StorageResult<u64>;
}
