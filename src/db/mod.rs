//! Persistence layer: a sqlite-vec vector store with a plain SQLite fallback.
//!
//! Both backends implement [`StorageBackend`]; [`Storage`] picks one at
//! construction and routes writes, resume lookups and searches through it.
use std::collections::HashSet;

use thiserror::Error;

pub mod fallback;
pub mod models;
pub mod search;
pub mod storage;
pub mod vector;

pub use fallback::RelationalFallback;
pub use models::{Collection, IndexEntry, Metadata, SearchHit};
pub use storage::{Storage, WriteOutcome};
pub use vector::VectorStore;

/// Errors raised by a storage backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("store holds {stored}-dimensional vectors, embedder produces {requested}")]
    DimensionMismatch { stored: usize, requested: usize },

    #[error("embedding has {got} dimensions, expected {expected}")]
    BadEmbedding { expected: usize, got: usize },

    #[error("{backend} does not support {operation} on {collection}")]
    Unsupported {
        backend: &'static str,
        operation: &'static str,
        collection: Collection,
    },

    #[error("connection lock poisoned")]
    Poisoned,
}

/// Which concrete backend is serving a [`Storage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Vector,
    Relational,
}

impl BackendKind {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            BackendKind::Vector => "vector store",
            BackendKind::Relational => "relational fallback",
        }
    }
}

/// Persistence abstraction shared by the vector store and the fallback.
pub trait StorageBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Whether `store_batch` can persist entries of `collection`.
    fn accepts(&self, collection: Collection) -> bool;

    /// Commit `entries` atomically: either every entry becomes visible to
    /// [`existing_ids`](Self::existing_ids) or none does. Entries with an
    /// id already present overwrite the stored record.
    fn store_batch(&self, collection: Collection, entries: &[IndexEntry])
    -> Result<(), StoreError>;

    /// Ids committed to `collection`. Never fails: lookup errors are logged
    /// and reported as an empty set.
    fn existing_ids(&self, collection: Collection) -> HashSet<String>;

    /// The `k` nearest entries to `query`, ordered by ascending distance.
    fn search(
        &self,
        collection: Collection,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<SearchHit>, StoreError>;
}

/// Serialize a float32 vector into little-endian bytes for the vec0 table.
pub fn serialize_vector(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}
