use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Key-value metadata stored alongside each entry. Always contains `path`.
pub type Metadata = BTreeMap<String, String>;

/// The three independent namespaces of indexed entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    /// Extracted text of each file, keyed by absolute path.
    FilesContent,
    /// Bare file names, keyed by the name itself.
    FilesName,
    /// Parent directories, keyed by absolute path.
    Folders,
}

impl Collection {
    pub const ALL: [Collection; 3] = [
        Collection::FilesContent,
        Collection::FilesName,
        Collection::Folders,
    ];

    /// Table / collection name as persisted.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Collection::FilesContent => "files_content",
            Collection::FilesName => "files_name",
            Collection::Folders => "folders",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One record ready to be committed to a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub id: String,
    pub path: String,
    pub document: String,
    pub embedding: Vec<f32>,
    pub metadata: Metadata,
}

impl IndexEntry {
    /// Build an entry whose metadata holds just `path`.
    #[must_use]
    pub fn new(id: String, path: String, document: String, embedding: Vec<f32>) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert("path".to_string(), path.clone());
        Self {
            id,
            path,
            document,
            embedding,
            metadata,
        }
    }

    /// Add a metadata field.
    #[must_use]
    pub fn with_meta(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// A nearest-neighbour hit. `distance` is cosine distance: lower is closer.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub document: String,
    pub metadata: Metadata,
    pub distance: f64,
}
