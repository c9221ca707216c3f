use std::collections::BTreeMap;

use tracing::{debug, warn};

use super::snippet::extract_snippet;
use super::{QueryResult, ResultGroup, SearchKind};
use crate::config::SnippetConfig;
use crate::db::{Collection, SearchHit, Storage};
use crate::embedder::Embedder;

/// Shown when a hit carries neither a `path` nor a `name`.
pub const NO_PATH: &str = "(no path)";

pub struct QueryEngine<'a, E: Embedder + ?Sized> {
    storage: &'a Storage,
    embedder: &'a E,
    before: usize,
    after: usize,
}

impl<'a, E: Embedder + ?Sized> QueryEngine<'a, E> {
    pub fn new(storage: &'a Storage, embedder: &'a E, snippet: &SnippetConfig) -> Self {
        Self {
            storage,
            embedder,
            before: snippet.before,
            after: snippet.after,
        }
    }

    /// Run `query` against the collections selected by `kind`.
    ///
    /// Every selected collection gets a group, possibly empty. Each group is
    /// ordered by ascending distance and holds at most `top_k` results. A
    /// failure in one collection leaves only that group empty.
    pub fn search(
        &self,
        query: &str,
        top_k: usize,
        kind: SearchKind,
    ) -> BTreeMap<ResultGroup, Vec<QueryResult>> {
        let mut groups: BTreeMap<ResultGroup, Vec<QueryResult>> = kind
            .collections()
            .iter()
            .map(|&c| (ResultGroup::from(c), Vec::new()))
            .collect();

        if top_k == 0 {
            return groups;
        }

        let query_vector = match self.embedder.embed(query) {
            Ok(v) => v,
            Err(e) => {
                warn!("Could not embed query {query:?}: {e}");
                return groups;
            }
        };

        for &collection in kind.collections() {
            let hits = match self.storage.search(collection, &query_vector, top_k) {
                Ok(hits) => hits,
                Err(e) => {
                    warn!("Search in {collection} failed: {e}");
                    continue;
                }
            };
            debug!("{} hits in {collection}", hits.len());

            let results = hits
                .into_iter()
                .take(top_k)
                .map(|hit| self.to_result(collection, query, hit))
                .collect();
            groups.insert(ResultGroup::from(collection), results);
        }
        groups
    }

    fn to_result(&self, collection: Collection, query: &str, hit: SearchHit) -> QueryResult {
        let path = ["path", "name"]
            .iter()
            .filter_map(|key| hit.metadata.get(*key))
            .find(|value| !value.is_empty())
            .cloned()
            .unwrap_or_else(|| NO_PATH.to_string());

        QueryResult {
            path,
            snippet: extract_snippet(&hit.document, query, self.before, self.after),
            score: hit.distance,
            kind: collection,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{IndexEntry, RelationalFallback, VectorStore};
    use crate::embedder::EmbedderError;
    use crate::embedder::hashing::HashEmbedder;
    use crate::id::make_id;

    const DIM: usize = 64;

    fn snippet_config() -> SnippetConfig {
        SnippetConfig {
            before: 10,
            after: 20,
        }
    }

    fn entry(embedder: &HashEmbedder, path: &str, document: &str) -> IndexEntry {
        IndexEntry::new(
            make_id(path),
            path.to_string(),
            document.to_string(),
            embedder.embed(document).unwrap(),
        )
    }

    fn populated() -> (Storage, HashEmbedder) {
        let embedder = HashEmbedder::new(DIM);
        let storage = Storage::from_backend(Box::new(VectorStore::open_in_memory(DIM).unwrap()));

        storage.store(
            Collection::FilesContent,
            &[
                entry(&embedder, "/docs/q1.txt", "first quarter revenue report"),
                entry(&embedder, "/docs/list.txt", "buy milk and eggs"),
                entry(&embedder, "/docs/trip.txt", "beach holiday photos"),
            ],
        );
        storage.store(
            Collection::FilesName,
            &[entry(&embedder, "/docs/q1.txt", "q1.txt").with_meta("name", "q1.txt")],
        );
        storage.store(Collection::Folders, &[entry(&embedder, "/docs", "/docs")]);
        (storage, embedder)
    }

    #[test]
    fn test_content_search_ranks_and_highlights() {
        let (storage, embedder) = populated();
        let engine = QueryEngine::new(&storage, &embedder, &snippet_config());

        let groups = engine.search("revenue", 2, SearchKind::Content);
        assert_eq!(groups.len(), 1);
        let results = &groups[&ResultGroup::Content];
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].path, "/docs/q1.txt");
        assert_eq!(results[0].kind, Collection::FilesContent);
        assert_eq!(
            results[0].snippet.as_deref(),
            Some("t quarter **revenue** report")
        );
        assert!(results[0].score <= results[1].score);
    }

    #[test]
    fn test_both_returns_files_and_folders_groups() {
        let (storage, embedder) = populated();
        let engine = QueryEngine::new(&storage, &embedder, &snippet_config());

        let groups = engine.search("q1.txt", 3, SearchKind::Both);
        let labels: Vec<_> = groups.keys().map(|g| g.label()).collect();
        assert_eq!(labels, vec!["Files", "Folders"]);
        assert_eq!(groups[&ResultGroup::Files][0].path, "/docs/q1.txt");
        assert_eq!(groups[&ResultGroup::Folders][0].path, "/docs");
    }

    #[test]
    fn test_zero_top_k_gives_empty_groups() {
        let (storage, embedder) = populated();
        let engine = QueryEngine::new(&storage, &embedder, &snippet_config());
        let groups = engine.search("revenue", 0, SearchKind::Both);
        assert_eq!(groups.len(), 2);
        assert!(groups.values().all(Vec::is_empty));
    }

    #[test]
    fn test_path_falls_back_to_name_then_sentinel() {
        let embedder = HashEmbedder::new(DIM);
        let storage = Storage::from_backend(Box::new(VectorStore::open_in_memory(DIM).unwrap()));

        let named = entry(&embedder, "", "alpha").with_meta("name", "alpha.txt");
        let mut bare = entry(&embedder, "x", "beta");
        bare.metadata.clear();
        storage.store(Collection::FilesName, &[named, bare]);

        let engine = QueryEngine::new(&storage, &embedder, &snippet_config());
        let mut paths: Vec<String> = engine.search("alpha", 5, SearchKind::Name)
            [&ResultGroup::Files]
            .iter()
            .map(|r| r.path.clone())
            .collect();
        paths.sort();
        assert_eq!(paths, vec![NO_PATH.to_string(), "alpha.txt".to_string()]);
    }

    #[test]
    fn test_failing_collection_yields_empty_group() {
        let embedder = HashEmbedder::new(DIM);
        let fallback = RelationalFallback::open_in_memory().unwrap();
        let storage = Storage::from_backend(Box::new(fallback));
        let engine = QueryEngine::new(&storage, &embedder, &snippet_config());

        let groups = engine.search("anything", 3, SearchKind::Content);
        assert_eq!(groups.len(), 1);
        assert!(groups[&ResultGroup::Content].is_empty());
    }

    struct BrokenEmbedder;

    impl Embedder for BrokenEmbedder {
        fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedderError> {
            Err(EmbedderError::InferenceFailed("offline".into()))
        }

        fn embed_batch(&self, _texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
            Err(EmbedderError::InferenceFailed("offline".into()))
        }

        fn dimensions(&self) -> usize {
            DIM
        }
    }

    #[test]
    fn test_embedding_failure_yields_empty_groups() {
        let (storage, _) = populated();
        let engine = QueryEngine::new(&storage, &BrokenEmbedder, &snippet_config());
        let groups = engine.search("revenue", 3, SearchKind::Both);
        assert_eq!(groups.len(), 2);
        assert!(groups.values().all(Vec::is_empty));
    }
}
