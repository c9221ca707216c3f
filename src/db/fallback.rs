//! Relational fallback: a plain SQLite file that keeps indexed content when
//! the vector store cannot be used. It stores, it answers resume lookups,
//! it does not search.
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension, params};
use tracing::{info, warn};

use super::models::{Collection, IndexEntry, SearchHit};
use super::{BackendKind, StorageBackend, StoreError};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS files_content (id TEXT PRIMARY KEY, path TEXT, content TEXT, embedding TEXT);
CREATE TABLE IF NOT EXISTS files_name (id TEXT PRIMARY KEY, path TEXT, name TEXT, embedding TEXT);
CREATE TABLE IF NOT EXISTS folders (id TEXT PRIMARY KEY, path TEXT, embedding TEXT);
"#;

pub struct RelationalFallback {
    conn: Mutex<Connection>,
}

impl RelationalFallback {
    /// Open (creating if needed) the fallback database file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        info!("Opening relational fallback: {}", path.display());
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    /// Open an in-memory fallback (useful for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Stored embedding for `id`, decoded from its JSON text form.
    pub fn embedding(&self, id: &str) -> Result<Option<Vec<f32>>, StoreError> {
        let conn = self.lock()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT embedding FROM files_content WHERE id = ?",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|s| serde_json::from_str(&s).map_err(StoreError::from))
            .transpose()
    }

    fn unsupported(operation: &'static str, collection: Collection) -> StoreError {
        StoreError::Unsupported {
            backend: BackendKind::Relational.label(),
            operation,
            collection,
        }
    }
}

impl StorageBackend for RelationalFallback {
    fn kind(&self) -> BackendKind {
        BackendKind::Relational
    }

    fn accepts(&self, collection: Collection) -> bool {
        collection == Collection::FilesContent
    }

    fn store_batch(
        &self,
        collection: Collection,
        entries: &[IndexEntry],
    ) -> Result<(), StoreError> {
        if !self.accepts(collection) {
            return Err(Self::unsupported("store_batch", collection));
        }
        if entries.is_empty() {
            return Ok(());
        }

        let rows = entries
            .iter()
            .map(|e| Ok((e, serde_json::to_string(&e.embedding)?)))
            .collect::<Result<Vec<_>, StoreError>>()?;

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO files_content (id, path, content, embedding) VALUES (?, ?, ?, ?)",
            )?;
            for (entry, embedding) in &rows {
                let path = entry
                    .metadata
                    .get("path")
                    .map(String::as_str)
                    .unwrap_or(entry.path.as_str());
                stmt.execute(params![entry.id, path, entry.document, embedding])?;
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
            warn!("Failed to read ids from fallback table {collection}: {e}");
            HashSet::new()
        })
    }

    fn search(
        &self,
        collection: Collection,
        _query: &[f32],
        _k: usize,
    ) -> Result<Vec<SearchHit>, StoreError> {
        Err(Self::unsupported("search", collection))
    }
}
