use std::collections::HashMap;

use crate::corpus::Document;
use crate::embed::Embedding;
use crate::store::{check_batch, cosine_similarity, rank, CollectionInfo, SearchResult, VectorStore};
use crate::Result;

struct MemoryCollection {
    model: String,
    dimension: usize,
    documents: Vec<Document>,
    embeddings: Vec<Embedding>,
}

/// In-memory vector store for development and testing.
///
/// Uses brute-force cosine similarity search. Nothing survives the process;
/// the marker exists once any collection has been written.
#[derive(Default)]
pub struct MemoryStore {
    collections: HashMap<String, MemoryCollection>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl VectorStore for MemoryStore {
    fn replace(
        &mut self,
        collection: &str,
        model: &str,
        documents: &[Document],
        embeddings: &[Embedding],
    ) -> Result<()> {
        let dimension = check_batch(documents, embeddings)?;
        self.collections.insert(
            collection.to_string(),
            MemoryCollection {
                model: model.to_string(),
                dimension,
                documents: documents.to_vec(),
                embeddings: embeddings.to_vec(),
            },
        );
        Ok(())
    }

    fn collection(&self, name: &str) -> Result<Option<CollectionInfo>> {
        Ok(self.collections.get(name).map(|c| CollectionInfo {
            name: name.to_string(),
            model: c.model.clone(),
            dimension: c.dimension,
            count: c.documents.len(),
        }))
    }

    fn search(&self, collection: &str, query: &Embedding, k: usize) -> Result<Vec<SearchResult>> {
        let Some(c) = self.collections.get(collection) else {
            return Ok(Vec::new());
        };

        let results = c
            .documents
            .iter()
            .zip(&c.embeddings)
            .map(|(document, embedding)| SearchResult {
                document: document.clone(),
                score: cosine_similarity(query, embedding),
            })
            .collect();
        Ok(rank(results, k))
    }

    fn drop_collection(&mut self, name: &str) -> Result<()> {
        self.collections.remove(name);
        Ok(())
    }

    fn marker_exists(&self) -> bool {
        !self.collections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::Metadata;

    fn course(id: &str) -> Document {
        Document {
            id: id.to_string(),
            text: format!("name: {id}"),
            metadata: Metadata::default(),
        }
    }

    fn ids(results: &[SearchResult]) -> Vec<&str> {
        results.iter().map(|r| r.document.id.as_str()).collect()
    }

    /// Three courses on a 2-d plane: rust along x, painting along y, python between.
    fn course_store() -> MemoryStore {
        let mut store = MemoryStore::new();
        store
            .replace(
                "courses",
                "hashing-v1",
                &[course("painting"), course("python"), course("rust")],
                &[vec![0.0, 1.0], vec![0.7, 0.7], vec![1.0, 0.0]],
            )
            .unwrap();
        store
    }

    #[test]
    fn test_replace_records_collection_info() {
        let empty = MemoryStore::new();
        assert!(empty.collection("courses").unwrap().is_none());
        assert!(!empty.marker_exists());

        let store = course_store();
        let info = store.collection("courses").unwrap().unwrap();
        assert_eq!(
            info,
            CollectionInfo {
                name: "courses".into(),
                model: "hashing-v1".into(),
                dimension: 2,
                count: 3,
            }
        );
        assert!(store.marker_exists());
    }

    #[test]
    fn test_search_ranks_by_direction() {
        let store = course_store();
        let results = store.search("courses", &vec![2.0, 0.1], 3).unwrap();
        assert_eq!(ids(&results), ["rust", "python", "painting"]);
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_search_truncates_to_k() {
        let store = course_store();
        assert_eq!(ids(&store.search("courses", &vec![0.0, 1.0], 1).unwrap()), ["painting"]);
        assert_eq!(store.search("courses", &vec![0.0, 1.0], 50).unwrap().len(), 3);
        assert!(store.search("courses", &vec![0.0, 1.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_equal_scores_keep_insertion_order() {
        let mut store = MemoryStore::new();
        let docs: Vec<_> = ["d", "a", "c", "b", "e"].into_iter().map(course).collect();
        let embeddings = vec![vec![1.0, 0.0], vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 0.0], vec![1.0, 0.0]];
        store.replace("dupes", "m", &docs, &embeddings).unwrap();

        let results = store.search("dupes", &vec![1.0, 0.0], 5).unwrap();
        assert_eq!(ids(&results), ["d", "a", "b", "e", "c"]);
    }

    #[test]
    fn test_rebuild_replaces_previous_contents() {
        let mut store = course_store();
        store.replace("courses", "hashing-v2", &[course("go")], &[vec![1.0, 0.0]]).unwrap();

        let info = store.collection("courses").unwrap().unwrap();
        assert_eq!((info.count, info.model.as_str()), (1, "hashing-v2"));
        assert_eq!(ids(&store.search("courses", &vec![1.0, 0.0], 5).unwrap()), ["go"]);
    }

    #[test]
    fn test_collections_do_not_leak() {
        let mut store = course_store();
        store.replace("books", "hashing-v1", &[course("rust-book")], &[vec![1.0, 0.0]]).unwrap();

        assert_eq!(ids(&store.search("books", &vec![1.0, 0.0], 10).unwrap()), ["rust-book"]);
        assert_eq!(store.search("courses", &vec![1.0, 0.0], 10).unwrap().len(), 3);
    }

    #[test]
    fn test_drop_last_collection_clears_marker() {
        let mut store = course_store();
        store.drop_collection("courses").unwrap();
        assert!(store.collection("courses").unwrap().is_none());
        assert!(!store.marker_exists());
        assert!(store.search("courses", &vec![1.0, 0.0], 5).unwrap().is_empty());
    }

    #[test]
    fn test_mismatched_batch_is_rejected() {
        let mut store = MemoryStore::new();
        assert!(store.replace("courses", "m", &[course("rust")], &[]).is_err());
        assert!(store.collection("courses").unwrap().is_none());
    }
}
