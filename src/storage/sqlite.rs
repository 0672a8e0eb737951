//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the DocumentSink trait.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{DocumentSink, StorageError, StorageResult, UpsertSummary};
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;

/// SQLite document store
///
/// The connection sits behind a mutex so jobs running on different scraper
/// workers can share one sink.
pub struct SqliteSink {
    conn: Mutex<Connection>,
}

impl SqliteSink {
    /// Opens or creates the database at `path`, creating missing parent
    /// directories
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteSink)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Document count per collection, sorted by collection name
    pub fn collection_counts(&self) -> StorageResult<Vec<(String, u64)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT collection, COUNT(*) FROM documents GROUP BY collection ORDER BY collection",
        )?;

        let counts = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(counts)
    }
}

impl DocumentSink for SqliteSink {
    fn upsert_batch(
        &self,
        collection: &str,
        docs: &[(String, Value)],
    ) -> StorageResult<UpsertSummary> {
        if collection.is_empty() {
            return Err(StorageError::InvalidDocument(
                "collection name cannot be empty".to_string(),
            ));
        }

        let now = Utc::now().to_rfc3339();
        let mut summary = UpsertSummary::default();
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut exists =
                tx.prepare_cached("SELECT 1 FROM documents WHERE collection = ?1 AND key = ?2")?;
            let mut upsert = tx.prepare_cached(
                "INSERT INTO documents (collection, key, body, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT(collection, key) DO UPDATE SET
                    body = excluded.body,
                    updated_at = excluded.updated_at",
            )?;

            for (key, doc) in docs {
                let body = serde_json::to_string(doc)?;
                let existed = exists
                    .query_row(params![collection, key], |_| Ok(()))
                    .optional()?
                    .is_some();

                upsert.execute(params![collection, key, body, now])?;
                if existed {
                    summary.updated += 1;
                } else {
                    summary.inserted += 1;
                }
            }
        }
        tx.commit()?;

        Ok(summary)
    }

    fn get(&self, collection: &str, key: &str) -> StorageResult<Option<Value>> {
        let conn = self.conn.lock();
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM documents WHERE collection = ?1 AND key = ?2",
                params![collection, key],
                |row| row.get(0),
            )
            .optional()?;

        match body {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    fn count(&self, collection: &str) -> StorageResult<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE collection = ?1",
            params![collection],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn doc(key: &str, value: Value) -> (String, Value) {
        (key.to_string(), value)
    }

    #[test]
    fn test_insert_then_update() {
        let sink = SqliteSink::open_in_memory().unwrap();

        let summary = sink
            .upsert_batch(
                "pages",
                &[doc("a", json!({"title": "A"})), doc("b", json!({"title": "B"}))],
            )
            .unwrap();
        assert_eq!(summary, UpsertSummary { inserted: 2, updated: 0 });

        let summary = sink
            .upsert_batch(
                "pages",
                &[doc("a", json!({"title": "A2"})), doc("c", json!({"title": "C"}))],
            )
            .unwrap();
        assert_eq!(summary, UpsertSummary { inserted: 1, updated: 1 });
        assert_eq!(summary.total(), 2);

        assert_eq!(sink.count("pages").unwrap(), 3);
        assert_eq!(sink.get("pages", "a").unwrap(), Some(json!({"title": "A2"})));
    }

    #[test]
    fn test_repeated_key_in_batch_counts_as_update() {
        let sink = SqliteSink::open_in_memory().unwrap();
        let summary = sink
            .upsert_batch("pages", &[doc("k", json!(1)), doc("k", json!(2))])
            .unwrap();

        assert_eq!(summary, UpsertSummary { inserted: 1, updated: 1 });
        assert_eq!(sink.get("pages", "k").unwrap(), Some(json!(2)));
    }

    #[test]
    fn test_collections_are_separate() {
        let sink = SqliteSink::open_in_memory().unwrap();
        sink.upsert_batch("pages", &[doc("k", json!("page"))]).unwrap();
        sink.upsert_batch("items", &[doc("k", json!("item")), doc("j", json!("item"))])
            .unwrap();

        assert_eq!(sink.get("pages", "k").unwrap(), Some(json!("page")));
        assert_eq!(sink.get("items", "k").unwrap(), Some(json!("item")));
        assert_eq!(sink.get("items", "missing").unwrap(), None);
        assert_eq!(sink.count("nothing").unwrap(), 0);
        assert_eq!(
            sink.collection_counts().unwrap(),
            vec![("items".to_string(), 2), ("pages".to_string(), 1)]
        );
    }

    #[test]
    fn test_empty_collection_rejected() {
        let sink = SqliteSink::open_in_memory().unwrap();
        assert!(matches!(
            sink.upsert_batch("", &[doc("k", json!(null))]),
            Err(StorageError::InvalidDocument(_))
        ));
    }

    #[test]
    fn test_file_database_persists() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("talpa.db");

        {
            let sink = SqliteSink::open(&path).unwrap();
            sink.upsert_batch("pages", &[doc("k", json!({"n": 1}))]).unwrap();
        }

        let sink = SqliteSink::open(&path).unwrap();
        assert_eq!(sink.get("pages", "k").unwrap(), Some(json!({"n": 1})));
    }

    #[test]
    fn test_open_creates_parent_directories() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("dir").join("talpa.db");

        let sink = SqliteSink::open(&path).unwrap();
        sink.upsert_batch("pages", &[doc("k", json!(true))]).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_open_reports_io_errors() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("file");
        std::fs::write(&blocker, b"").unwrap();

        let result = SqliteSink::open(&blocker.join("talpa.db"));
        assert!(matches!(result, Err(StorageError::Io(_))));
    }
}
