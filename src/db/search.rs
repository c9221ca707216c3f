use rusqlite::params;
use tracing::warn;

use super::models::{Collection, Metadata, SearchHit};
use super::vector::VectorStore;
use super::{StoreError, serialize_vector};

fn parse_metadata(raw: &str) -> Metadata {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        warn!("Unreadable metadata {raw:?}: {e}");
        Metadata::new()
    })
}

impl VectorStore {
    /// Perform vector similarity search using cosine distance.
    ///
    /// Hits come back ordered by ascending distance (closest first), at most
    /// `top_k` of them.
    pub fn nearest(
        &self,
        collection: Collection,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchHit>, StoreError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let t = collection.name();
        let query = format!(
            r#"
            SELECT
                c.document,
                c.metadata,
                vec_distance_cosine(v.embedding, ?) AS distance
            FROM {t}_vec v
            JOIN {t} c ON v.rowid = c.entry_id
            ORDER BY distance ASC
            LIMIT ?
            "#
        );

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&query)?;
        let rows = stmt.query_map(
            params![serialize_vector(query_vector), top_k as i64],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, f64>(2)?,
                ))
            },
        )?;

        let mut results = Vec::new();
        for row in rows {
            let (document, metadata, distance) = row?;
            results.push(SearchHit {
                document,
                metadata: parse_metadata(&metadata),
                distance,
            });
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::StorageBackend;
    use crate::db::models::IndexEntry;

    fn unit(i: usize) -> Vec<f32> {
        let mut v = vec![0.0f32; 4];
        v[i] = 1.0;
        v
    }

    fn seeded() -> VectorStore {
        let store = VectorStore::open_in_memory(4).unwrap();
        let entries = vec![
            IndexEntry::new("a".into(), "/r/rust.md".into(), "Rust programming".into(), unit(0)),
            IndexEntry::new("b".into(), "/r/go.md".into(), "Go programming".into(), vec![0.7, 0.7, 0.0, 0.0]),
            IndexEntry::new("c".into(), "/r/cook.md".into(), "Cooking".into(), unit(2)),
        ];
        store.store_batch(Collection::FilesContent, &entries).unwrap();
        store
    }

    #[test]
    fn test_search_orders_by_distance() {
        let store = seeded();
        let hits = store.search(Collection::FilesContent, &unit(0), 5).unwrap();

        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].document, "Rust programming");
        assert!(hits[0].distance < 1e-6, "identical vector should be distance 0");
        assert_eq!(hits[0].metadata.get("path").map(String::as_str), Some("/r/rust.md"));
        assert_eq!(hits[1].document, "Go programming");
        for pair in hits.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }
    }

    #[test]
    fn test_search_respects_top_k() {
        let store = seeded();
        assert_eq!(store.search(Collection::FilesContent, &unit(0), 2).unwrap().len(), 2);
        assert!(store.search(Collection::FilesContent, &unit(0), 0).unwrap().is_empty());
    }

    #[test]
    fn test_search_empty_collection() {
        let store = seeded();
        assert!(store.search(Collection::Folders, &unit(1), 3).unwrap().is_empty());
    }

    #[test]
    fn test_search_rejects_wrong_dimensions() {
        let store = seeded();
        assert!(store.search(Collection::FilesContent, &[1.0, 0.0], 3).is_err());
    }

    #[test]
    fn test_parse_metadata_bad_json() {
        assert!(parse_metadata("not json").is_empty());
    }
}
