// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vector stores and SQLite-based persistence for item embeddings.
//!
//! Every store answers similarity queries by brute force: each query decodes
//! and scores all N stored vectors, O(N·D). This is fine for a single
//! process with modest data but does not scale horizontally; there is no
//! approximate nearest-neighbour index.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

use crate::embedding::codec::{decode, encode};
use crate::embedding::similarity::rank;
use crate::item::ItemId;

/// Current schema version written to the `meta` table.
const SCHEMA_VERSION: &str = "1";

/// A stored (item, representation) pair as read during a scan.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntry {
    pub item_id: ItemId,
    /// Codec representation, possibly malformed
    pub representation: String,
}

/// A search result from similarity search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityResult {
    /// The matching item
    pub item_id: ItemId,
    /// Cosine similarity score (-1.0 to 1.0)
    pub similarity: f32,
    /// 1.0 - similarity
    pub distance: f32,
}

impl SimilarityResult {
    pub fn new(item_id: ItemId, similarity: f32) -> Self {
        Self {
            item_id,
            similarity,
            distance: 1.0 - similarity,
        }
    }
}

/// Holds (item id, vector) pairs and answers brute-force similarity queries.
///
/// Writes for the same item are last-writer-wins. Queries read a snapshot
/// taken when the scan starts, so concurrent upserts never break a scan.
pub trait VectorStore: Send + Sync {
    /// Stores an already-encoded representation, replacing any previous one.
    fn upsert_raw(&self, item_id: &ItemId, representation: &str) -> Result<()>;

    /// Returns the stored representation for an item.
    fn get_raw(&self, item_id: &ItemId) -> Result<Option<String>>;

    /// Removes an item's vector. Returns whether anything was removed.
    fn remove(&self, item_id: &ItemId) -> Result<bool>;

    /// Number of stored entries, including unusable ones.
    fn len(&self) -> Result<usize>;

    /// All entries in first-insertion order.
    fn snapshot(&self) -> Result<Vec<StoredEntry>>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Stores a vector, replacing any previous one. An empty slice stores
    /// the empty sentinel.
    fn upsert(&self, item_id: &ItemId, vector: &[f32]) -> Result<()> {
        self.upsert_raw(item_id, &encode(vector))
    }

    /// Returns the decoded vector for an item. Undecodable entries come back
    /// as the empty vector.
    fn get(&self, item_id: &ItemId) -> Result<Option<Vec<f32>>> {
        Ok(self.get_raw(item_id)?.map(|raw| decode(&raw)))
    }

    /// Ranks stored vectors by cosine similarity to `query_vector`.
    ///
    /// Entries that fail to decode or have a different length than the
    /// query are skipped. At most `limit` results, best first.
    fn query(&self, query_vector: &[f32], limit: usize) -> Result<Vec<SimilarityResult>> {
        let entries = self.snapshot()?;
        Ok(rank(&entries, query_vector, limit))
    }
}

/// SQLite-based storage for embedding vectors.
///
/// Stores embeddings in `.embedsearch/embeddings.sqlite` by default.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl SqliteStore {
    /// Opens or creates a store at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create directory: {}", parent.display())
                })?;
            }
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let has_tables: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
            [],
            |row| row.get(0),
        )?;

        let store = Self {
            conn: Mutex::new(conn),
            path,
        };
        store.init_schema(has_tables == 0)?;
        info!(path = %store.path.display(), "opened embedding store");

        Ok(store)
    }

    /// Opens a store that must already exist; never creates the file.
    pub fn open_existing<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            anyhow::bail!(
                "No embedding store at {}. Run 'embedsearch index' first.",
                path.display()
            );
        }

        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("Failed to open database: {}", path.display()))?;

        let store = Self {
            conn: Mutex::new(conn),
            path,
        };
        store.init_schema(false)?;
        Ok(store)
    }

    /// Opens a store in the default location under `root`.
    pub fn open_default<P: AsRef<Path>>(root: P) -> Result<Self> {
        let db_path = root
            .as_ref()
            .join(crate::utils::INDEX_DIR)
            .join("embeddings.sqlite");
        Self::open(db_path)
    }

    /// Opens an in-memory database, mostly useful in tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        let store = Self {
            conn: Mutex::new(conn),
            path: PathBuf::from(":memory:"),
        };
        store.init_schema(true)?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("embedding store connection lock poisoned"))
    }

    /// Initializes the database schema if it does not exist.
    fn init_schema(&self, bootstrap_meta: bool) -> Result<()> {
        self.conn()?
            .execute_batch(
                r#"
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS item_embeddings (
                item_id TEXT PRIMARY KEY,
                embedding TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
            )
            .context("Failed to initialize database schema")?;

        if bootstrap_meta {
            self.set_meta("schema_version", SCHEMA_VERSION)?;
        }

        Ok(())
    }

    /// Records the deployment's embedding dimension and model.
    ///
    /// A different dimension from an earlier run is logged but not fixed:
    /// old vectors are skipped by queries and replaced as items are
    /// re-embedded, or dropped wholesale with `clear_all`.
    pub fn bind_embedding_config(&self, dimension: usize, model: &str) -> Result<()> {
        let dimension_str = dimension.to_string();
        if let Some(stored) = self.get_meta("embedding_length")? {
            if stored != dimension_str {
                warn!(
                    stored = %stored,
                    configured = dimension,
                    "embedding length changed; stored vectors of the old length will be ignored"
                );
            }
        }
        if let Some(stored) = self.get_meta("embedding_model")? {
            if stored != model {
                warn!(stored = %stored, configured = %model, "embedding model changed");
            }
        }
        self.set_meta("embedding_length", &dimension_str)?;
        self.set_meta("embedding_model", model)?;
        Ok(())
    }

    /// Resets the database schema, dropping all tables.
    pub fn reset_schema(&self) -> Result<()> {
        self.conn()?
            .execute_batch(
                r#"
            DROP TABLE IF EXISTS item_embeddings;
            DROP TABLE IF EXISTS meta;
            "#,
            )
            .context("Failed to reset embedding schema")?;

        self.init_schema(true)
    }

    /// Returns the path to the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Deletes all embeddings from the database.
    pub fn clear_all(&self) -> Result<()> {
        self.conn()?
            .execute("DELETE FROM item_embeddings", [])
            .context("Failed to clear all embeddings")?;
        Ok(())
    }

    /// Gets metadata value by key.
    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn()?
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to get meta")?;
        Ok(value)
    }

    /// Sets metadata value.
    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.conn()?.execute(
            r#"
            INSERT INTO meta (key, value)
            VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
            params![key, value],
        )?;
        Ok(())
    }
}

impl VectorStore for SqliteStore {
    fn upsert_raw(&self, item_id: &ItemId, representation: &str) -> Result<()> {
        let updated_at = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;

        // ON CONFLICT keeps the rowid, so scan order stays first-insertion order.
        self.conn()?
            .execute(
                r#"
                INSERT INTO item_embeddings (item_id, embedding, updated_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(item_id) DO UPDATE SET
                    embedding = excluded.embedding,
                    updated_at = excluded.updated_at
                "#,
                params![item_id.as_str(), representation, updated_at],
            )
            .with_context(|| format!("Failed to store embedding for {}", item_id))?;
        Ok(())
    }

    fn get_raw(&self, item_id: &ItemId) -> Result<Option<String>> {
        let representation = self
            .conn()?
            .query_row(
                "SELECT embedding FROM item_embeddings WHERE item_id = ?1",
                params![item_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query embedding")?;
        Ok(representation)
    }

    fn remove(&self, item_id: &ItemId) -> Result<bool> {
        let deleted = self
            .conn()?
            .execute(
                "DELETE FROM item_embeddings WHERE item_id = ?1",
                params![item_id.as_str()],
            )
            .context("Failed to delete embedding")?;
        Ok(deleted > 0)
    }

    fn len(&self) -> Result<usize> {
        let count: i64 =
            self.conn()?
                .query_row("SELECT COUNT(*) FROM item_embeddings", [], |row| {
                    row.get(0)
                })?;
        Ok(count as usize)
    }

    fn snapshot(&self) -> Result<Vec<StoredEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT item_id, embedding
            FROM item_embeddings
            ORDER BY rowid
            "#,
        )?;

        let entries = stmt
            .query_map([], |row| {
                let item_id: String = row.get(0)?;
                Ok(StoredEntry {
                    item_id: ItemId::from(item_id),
                    representation: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("Failed to scan embeddings")?;

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use tempfile::tempdir;

    #[test]
    fn test_storage_create_and_open() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("embeddings.sqlite");

        let store = SqliteStore::open(&db_path).unwrap();
        assert!(db_path.exists());
        store.upsert(&ItemId::from("a"), &[1.0, 2.0]).unwrap();
        drop(store);

        let store = SqliteStore::open(&db_path).unwrap();
        assert_eq!(store.get(&ItemId::from("a")).unwrap(), Some(vec![1.0, 2.0]));
        assert_eq!(store.get_meta("schema_version").unwrap().as_deref(), Some("1"));
    }

    #[test]
    fn test_open_existing_never_creates() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested").join("embeddings.sqlite");

        let err = SqliteStore::open_existing(&db_path).err().unwrap();
        assert!(err.to_string().contains("No embedding store"));
        assert!(!db_path.exists());
        assert!(!dir.path().join("nested").exists());

        SqliteStore::open(&db_path)
            .unwrap()
            .upsert(&ItemId::from("a"), &[1.0])
            .unwrap();
        let store = SqliteStore::open_existing(&db_path).unwrap();
        assert_eq!(store.get(&ItemId::from("a")).unwrap(), Some(vec![1.0]));
    }

    #[test]
    fn test_scan_during_concurrent_upserts() {
        let dir = tempdir().unwrap();
        let store = Arc::new(SqliteStore::open(dir.path().join("embeddings.sqlite")).unwrap());
        for i in 0..100u64 {
            store.upsert(&ItemId::from(i), &[1.0, i as f32]).unwrap();
        }

        let writer = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..300u64 {
                    store
                        .upsert(&ItemId::from(i % 150), &[0.5, i as f32])
                        .unwrap();
                }
            })
        };

        for _ in 0..30 {
            let results = store.query(&[1.0, 0.0], 10).unwrap();
            assert_eq!(results.len(), 10);
            assert!(results
                .windows(2)
                .all(|pair| pair[0].similarity >= pair[1].similarity));
        }
        writer.join().unwrap();
        assert_eq!(store.len().unwrap(), 150);
    }

    #[test]
    fn test_upsert_replaces() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = ItemId::from("a");
        store.upsert(&id, &[1.0, 0.0]).unwrap();
        store.upsert(&id, &[0.0, 1.0]).unwrap();

        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(store.get(&id).unwrap(), Some(vec![0.0, 1.0]));
        assert_eq!(store.get(&ItemId::from("missing")).unwrap(), None);
    }

    #[test]
    fn test_similarity_search() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.upsert(&ItemId::from("a"), &[1.0, 0.0, 0.0]).unwrap();
        store.upsert(&ItemId::from("b"), &[0.0, 1.0, 0.0]).unwrap();
        store.upsert(&ItemId::from("c"), &[0.9, 0.1, 0.0]).unwrap();

        let results = store.query(&[1.0, 0.0, 0.0], 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].item_id.as_str(), "a");
        assert_eq!(results[1].item_id.as_str(), "c");
        assert!((results[0].similarity - 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_corrupt_entry_is_skipped() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.upsert(&ItemId::from("good"), &[1.0, 0.0]).unwrap();
        store
            .upsert_raw(&ItemId::from("bad"), "[1.0, 0.0")
            .unwrap();

        let results = store.query(&[1.0, 0.0], 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].item_id.as_str(), "good");
        assert_eq!(store.get(&ItemId::from("bad")).unwrap(), Some(Vec::new()));
    }

    #[test]
    fn test_update_keeps_scan_order() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.upsert(&ItemId::from("first"), &[1.0, 0.0]).unwrap();
        store.upsert(&ItemId::from("second"), &[1.0, 0.0]).unwrap();
        store.upsert(&ItemId::from("first"), &[2.0, 0.0]).unwrap();

        let ids: Vec<String> = store
            .snapshot()
            .unwrap()
            .into_iter()
            .map(|e| e.item_id.to_string())
            .collect();
        assert_eq!(ids, vec!["first", "second"]);
    }

    #[test]
    fn test_remove_and_clear() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.upsert(&ItemId::from("a"), &[1.0]).unwrap();
        store.upsert(&ItemId::from("b"), &[1.0]).unwrap();

        assert!(store.remove(&ItemId::from("a")).unwrap());
        assert!(!store.remove(&ItemId::from("a")).unwrap());
        assert_eq!(store.len().unwrap(), 1);

        store.clear_all().unwrap();
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_bind_embedding_config() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.bind_embedding_config(768, "embedding-001").unwrap();
        assert_eq!(store.get_meta("embedding_length").unwrap().as_deref(), Some("768"));

        store.bind_embedding_config(384, "minilm").unwrap();
        assert_eq!(store.get_meta("embedding_length").unwrap().as_deref(), Some("384"));
        assert_eq!(store.get_meta("embedding_model").unwrap().as_deref(), Some("minilm"));
    }

    #[test]
    fn test_reset_schema() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.upsert(&ItemId::from("a"), &[1.0]).unwrap();
        store.set_meta("embedding_length", "1").unwrap();

        store.reset_schema().unwrap();
        assert!(store.is_empty().unwrap());
        assert!(store.get_meta("embedding_length").unwrap().is_none());
        assert_eq!(store.get_meta("schema_version").unwrap().as_deref(), Some("1"));
    }
}
