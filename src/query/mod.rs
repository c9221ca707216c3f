//! Query side: embed a query, search collections, build display results.
pub mod engine;
pub mod snippet;

use serde::{Deserialize, Serialize};

use crate::db::Collection;

pub use engine::{NO_PATH, QueryEngine};
pub use snippet::extract_snippet;

/// Which collections a search covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SearchKind {
    Content,
    Name,
    Folder,
    /// File names and folders together.
    Both,
}

impl SearchKind {
    #[must_use]
    pub fn collections(self) -> &'static [Collection] {
        match self {
            SearchKind::Content => &[Collection::FilesContent],
            SearchKind::Name => &[Collection::FilesName],
            SearchKind::Folder => &[Collection::Folders],
            SearchKind::Both => &[Collection::FilesName, Collection::Folders],
        }
    }
}

/// Display group for results coming from one collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ResultGroup {
    Content,
    Files,
    Folders,
}

impl ResultGroup {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            ResultGroup::Content => "Content",
            ResultGroup::Files => "Files",
            ResultGroup::Folders => "Folders",
        }
    }
}

impl From<Collection> for ResultGroup {
    fn from(collection: Collection) -> Self {
        match collection {
            Collection::FilesContent => ResultGroup::Content,
            Collection::FilesName => ResultGroup::Files,
            Collection::Folders => ResultGroup::Folders,
        }
    }
}

/// One ranked hit. `score` is cosine distance: lower is more similar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub path: String,
    pub snippet: Option<String>,
    pub score: f64,
    pub kind: Collection,
}
