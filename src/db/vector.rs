//! Primary vector store on SQLite + sqlite-vec.
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, Once};

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use sqlite_vec::sqlite3_vec_init;
use tracing::{info, warn};

use super::models::{Collection, IndexEntry, SearchHit};
use super::{BackendKind, StorageBackend, StoreError, serialize_vector};

/// Database file created inside the store directory.
pub const DB_FILE: &str = "vectors.db";

const META_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS store_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

fn collection_schema(collection: Collection, dimensions: usize) -> String {
    let t = collection.name();
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {t} (
    entry_id INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    path TEXT NOT NULL,
    document TEXT NOT NULL,
    metadata TEXT NOT NULL,
    indexed_at DATETIME NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_{t}_path ON {t}(path);

CREATE VIRTUAL TABLE IF NOT EXISTS {t}_vec USING vec0(
    embedding FLOAT[{dimensions}]
);
"#
    )
}

static INIT_VEC: Once = Once::new();

/// Register the sqlite-vec extension for every new connection. Safe to call
/// multiple times.
fn init_sqlite_vec() {
    INIT_VEC.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite3_vec_init as *const (),
        )));
    });
}

/// Directory-backed store holding the three collections with their vectors.
pub struct VectorStore {
    pub(crate) conn: Mutex<Connection>,
    pub(crate) dimensions: usize,
}

impl VectorStore {
    /// Open (creating if needed) the store under `dir`.
    pub fn open<P: AsRef<Path>>(dir: P, dimensions: usize) -> Result<Self, StoreError> {
        let dir = dir.as_ref();
        info!("Initializing vector store: {}", dir.display());

        std::fs::create_dir_all(dir)?;
        init_sqlite_vec();
        let conn = Connection::open(dir.join(DB_FILE))?;
        Self::init(conn, dimensions)
    }

    /// Open an in-memory store (useful for testing).
    pub fn open_in_memory(dimensions: usize) -> Result<Self, StoreError> {
        init_sqlite_vec();
        let conn = Connection::open_in_memory()?;
        Self::init(conn, dimensions)
    }

    fn init(conn: Connection, dimensions: usize) -> Result<Self, StoreError> {
        let vec_version: String = conn.query_row("SELECT vec_version()", [], |row| row.get(0))?;
        info!("sqlite-vec version: {}", vec_version);

        conn.execute_batch(META_SQL)?;

        let stored: Option<String> = conn
            .query_row(
                "SELECT value FROM store_meta WHERE key = 'dimensions'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        match stored {
            Some(value) => {
                let stored = value.parse::<usize>().unwrap_or(0);
                if stored != dimensions {
                    return Err(StoreError::DimensionMismatch {
                        stored,
                        requested: dimensions,
                    });
                }
            }
            None => {
                conn.execute(
                    "INSERT INTO store_meta (key, value) VALUES ('dimensions', ?)",
                    params![dimensions.to_string()],
                )?;
            }
        }

        for collection in Collection::ALL {
            conn.execute_batch(&collection_schema(collection, dimensions))?;
        }

        info!("Vector store ready ({dimensions} dimensions)");

        Ok(Self {
            conn: Mutex::new(conn),
            dimensions,
        })
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Number of committed entries in `collection`.
    pub fn count(&self, collection: Collection) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", collection.name()),
            [],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    fn check_dimensions(&self, embedding: &[f32]) -> Result<(), StoreError> {
        if embedding.len() != self.dimensions {
            return Err(StoreError::BadEmbedding {
                expected: self.dimensions,
                got: embedding.len(),
            });
        }
        Ok(())
    }
}

impl StorageBackend for VectorStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Vector
    }

    fn accepts(&self, _collection: Collection) -> bool {
        true
    }

    fn store_batch(
        &self,
        collection: Collection,
        entries: &[IndexEntry],
    ) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Ok(());
        }
        for entry in entries {
            self.check_dimensions(&entry.embedding)?;
        }

        let t = collection.name();
        let upsert = format!(
            r#"
            INSERT INTO {t} (id, path, document, metadata, indexed_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                path = excluded.path,
                document = excluded.document,
                metadata = excluded.metadata,
                indexed_at = excluded.indexed_at
            RETURNING entry_id
            "#
        );
        let delete_vec = format!("DELETE FROM {t}_vec WHERE rowid = ?");
        let insert_vec = format!("INSERT INTO {t}_vec (rowid, embedding) VALUES (?, ?)");

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let now = Utc::now();
        {
            let mut upsert = tx.prepare_cached(&upsert)?;
            let mut delete_vec = tx.prepare_cached(&delete_vec)?;
            let mut insert_vec = tx.prepare_cached(&insert_vec)?;

            for entry in entries {
                let metadata = serde_json::to_string(&entry.metadata)?;
                let entry_id: i64 = upsert.query_row(
                    params![entry.id, entry.path, entry.document, metadata, now],
                    |row| row.get(0),
                )?;

                // Re-indexing an id replaces its vector.
                delete_vec.execute(params![entry_id])?;
                insert_vec.execute(params![entry_id, serialize_vector(&entry.embedding)])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn existing_ids(&self, collection: Collection) -> HashSet<String> {
        let read = || -> Result<HashSet<String>, StoreError> {
            let conn = self.lock()?;
            let mut stmt = conn.prepare(&format!("SELECT id FROM {}", collection.name()))?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            let mut ids = HashSet::new();
            for row in rows {
                ids.insert(row?);
            }
            Ok(ids)
        };

        read().unwrap_or_else(|e| {
            warn!("Failed to read ids from {collection}: {e}");
            HashSet::new()
        })
    }

    fn search(
        &self,
        collection: Collection,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<SearchHit>, StoreError> {
        self.check_dimensions(query)?;
        self.nearest(collection, query, k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry(id: &str, path: &str, doc: &str, v: Vec<f32>) -> IndexEntry {
        IndexEntry::new(id.to_string(), path.to_string(), doc.to_string(), v)
    }

    #[test]
    fn test_store_init_creates_tables() {
        let store = VectorStore::open_in_memory(4).unwrap();
        let conn = store.lock().unwrap();
        let tables: usize = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type='table' AND name IN \
                 ('files_content', 'files_name', 'folders', 'files_content_vec', 'files_name_vec', 'folders_vec', 'store_meta')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 7);
    }

    #[test]
    fn test_store_and_existing_ids() {
        let store = VectorStore::open_in_memory(4).unwrap();
        store
            .store_batch(
                Collection::FilesContent,
                &[
                    entry("a", "/r/a.txt", "alpha", vec![1.0, 0.0, 0.0, 0.0]),
                    entry("b", "/r/b.txt", "beta", vec![0.0, 1.0, 0.0, 0.0]),
                ],
            )
            .unwrap();

        let ids = store.existing_ids(Collection::FilesContent);
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("a") && ids.contains("b"));
        // Collections are independent namespaces.
        assert!(store.existing_ids(Collection::FilesName).is_empty());
    }

    #[test]
    fn test_restore_same_id_overwrites() {
        let store = VectorStore::open_in_memory(4).unwrap();
        let c = Collection::FilesContent;
        store
            .store_batch(c, &[entry("a", "/r/a.txt", "old", vec![1.0, 0.0, 0.0, 0.0])])
            .unwrap();
        store
            .store_batch(c, &[entry("a", "/r/a.txt", "new", vec![0.0, 0.0, 1.0, 0.0])])
            .unwrap();

        assert_eq!(store.count(c).unwrap(), 1);
        let conn = store.lock().unwrap();
        let vec_rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM files_content_vec", [], |row| row.get(0))
            .unwrap();
        assert_eq!(vec_rows, 1);
        let doc: String = conn
            .query_row("SELECT document FROM files_content WHERE id = 'a'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(doc, "new");
    }

    #[test]
    fn test_batch_is_all_or_nothing() {
        let store = VectorStore::open_in_memory(4).unwrap();
        let result = store.store_batch(
            Collection::FilesContent,
            &[
                entry("ok", "/r/ok.txt", "fine", vec![1.0, 0.0, 0.0, 0.0]),
                entry("bad", "/r/bad.txt", "short", vec![1.0, 0.0]),
            ],
        );
        assert!(matches!(
            result,
            Err(StoreError::BadEmbedding {
                expected: 4,
                got: 2
            })
        ));
        assert!(store.existing_ids(Collection::FilesContent).is_empty());
    }

    #[test]
    fn test_reopen_persists_and_checks_dimensions() {
        let dir = tempdir().unwrap();
        {
            let store = VectorStore::open(dir.path(), 4).unwrap();
            store
                .store_batch(
                    Collection::Folders,
                    &[entry("f", "/r", "/r", vec![0.5, 0.5, 0.5, 0.5])],
                )
                .unwrap();
        }
        assert!(dir.path().join(DB_FILE).exists());

        let store = VectorStore::open(dir.path(), 4).unwrap();
        assert!(store.existing_ids(Collection::Folders).contains("f"));

        let err = VectorStore::open(dir.path(), 8).err().unwrap();
        assert!(matches!(
            err,
            StoreError::DimensionMismatch {
                stored: 4,
                requested: 8
            }
        ));
    }

    #[test]
    fn test_open_fails_when_dir_is_a_file() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, "x").unwrap();
        assert!(VectorStore::open(&blocker, 4).is_err());
    }
}
