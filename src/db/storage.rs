//! Backend selection and write routing.
//!
//! The backend is chosen once, when the [`Storage`] is built: the vector
//! store if it opens, otherwise the relational fallback for the rest of the
//! process. While the vector store is active, a failed `files_content` write
//! gets one retry against the fallback file, opened on first need.
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{error, info, warn};

use super::fallback::RelationalFallback;
use super::models::{Collection, IndexEntry, SearchHit};
use super::vector::VectorStore;
use super::{BackendKind, StorageBackend, StoreError};

/// What became of a batch handed to [`Storage::store`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Written to the active backend.
    Committed,
    /// The active backend failed; the batch was written to the fallback.
    Rescued,
    /// Nothing was written. The ids stay absent, so a resumed run retries.
    Dropped,
}

enum Rescue {
    Pending(PathBuf),
    Ready(Box<dyn StorageBackend>),
    Unavailable,
}

pub struct Storage {
    backend: Box<dyn StorageBackend>,
    rescue: Mutex<Rescue>,
}

impl Storage {
    /// Try the vector store under `vector_dir`; on any error use the
    /// fallback at `fallback_path` for the lifetime of this value.
    pub fn open(
        vector_dir: &Path,
        fallback_path: &Path,
        dimensions: usize,
    ) -> Result<Self, StoreError> {
        match VectorStore::open(vector_dir, dimensions) {
            Ok(store) => Ok(Self {
                backend: Box::new(store),
                rescue: Mutex::new(Rescue::Pending(fallback_path.to_path_buf())),
            }),
            Err(e) => {
                warn!(
                    "Vector store at {} unavailable: {e}",
                    vector_dir.display()
                );
                warn!(
                    "Using relational fallback at {} for this run; search is unavailable",
                    fallback_path.display()
                );
                let fallback = RelationalFallback::open(fallback_path)?;
                Ok(Self::from_backend(Box::new(fallback)))
            }
        }
    }

    /// Wrap a backend with no rescue path.
    #[must_use]
    pub fn from_backend(backend: Box<dyn StorageBackend>) -> Self {
        Self {
            backend,
            rescue: Mutex::new(Rescue::Unavailable),
        }
    }

    /// Wrap a primary backend with an already-open rescue backend.
    #[must_use]
    pub fn with_rescue(backend: Box<dyn StorageBackend>, rescue: Box<dyn StorageBackend>) -> Self {
        Self {
            backend,
            rescue: Mutex::new(Rescue::Ready(rescue)),
        }
    }

    #[must_use]
    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Whether the active backend can persist `collection`.
    #[must_use]
    pub fn accepts(&self, collection: Collection) -> bool {
        self.backend.accepts(collection)
    }

    /// Ids committed to `collection` on the active backend.
    #[must_use]
    pub fn existing_ids(&self, collection: Collection) -> HashSet<String> {
        self.backend.existing_ids(collection)
    }

    pub fn search(
        &self,
        collection: Collection,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<SearchHit>, StoreError> {
        self.backend.search(collection, query, k)
    }

    /// Persist one batch. Failures are contained and logged, never returned.
    pub fn store(&self, collection: Collection, entries: &[IndexEntry]) -> WriteOutcome {
        if entries.is_empty() {
            return WriteOutcome::Committed;
        }

        let err = match self.backend.store_batch(collection, entries) {
            Ok(()) => return WriteOutcome::Committed,
            Err(e) => e,
        };

        if collection == Collection::FilesContent && self.backend.kind() == BackendKind::Vector {
            warn!(
                "Write of {} entries to {collection} failed ({err}); retrying on fallback",
                entries.len()
            );
            return self.rescue_write(collection, entries);
        }

        error!(
            "Dropped batch of {} entries for {collection} on {}: {err}",
            entries.len(),
            self.backend.kind().label()
        );
        WriteOutcome::Dropped
    }

    fn rescue_write(&self, collection: Collection, entries: &[IndexEntry]) -> WriteOutcome {
        let mut rescue = match self.rescue.lock() {
            Ok(guard) => guard,
            Err(_) => {
                error!("Fallback lock poisoned; dropped batch of {}", entries.len());
                return WriteOutcome::Dropped;
            }
        };

        if let Rescue::Pending(path) = &*rescue {
            let path = path.clone();
            *rescue = match RelationalFallback::open(&path) {
                Ok(fallback) => {
                    info!("Opened fallback store {}", path.display());
                    Rescue::Ready(Box::new(fallback))
                }
                Err(e) => {
                    error!("Cannot open fallback store {}: {e}", path.display());
                    Rescue::Unavailable
                }
            };
        }

        match &*rescue {
            Rescue::Ready(fallback) => match fallback.store_batch(collection, entries) {
                Ok(()) => WriteOutcome::Rescued,
                Err(e) => {
                    error!(
                        "Fallback write failed; dropped batch of {} entries: {e}",
                        entries.len()
                    );
                    WriteOutcome::Dropped
                }
            },
            _ => {
                error!(
                    "No fallback available; dropped batch of {} entries",
                    entries.len()
                );
                WriteOutcome::Dropped
            }
        }
    }
}
