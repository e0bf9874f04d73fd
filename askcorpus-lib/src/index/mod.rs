//! Vector index management
//!
//! Combines an embedder and a store into build / load / query over one
//! named collection at a time.
//!
//! # Usage
//!
//! ```ignore
//! use askcorpus_lib::index::IndexManager;
//!
//! let index = IndexManager::new(embedder, store, "courses_en");
//!
//! // Full rebuild of a collection
//! index.build(&documents, "courses_en")?;
//!
//! // Attach to a persisted collection (false if missing or empty)
//! let ready = index.load("courses_en");
//!
//! // Best-effort similarity query
//! let results = index.query("Which course covers Rust?", 3);
//! ```

use std::sync::{Mutex, RwLock};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::corpus::Document;
use crate::embed::{Embedder, Embedding};
use crate::store::{SearchResult, VectorStore};
use crate::{Error, Result};

/// Documents embedded per call to the embedder.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Owns embedding, persistence and similarity search for a collection.
///
/// The embedder sits behind a mutex (providers need `&mut self`); the store
/// behind a read-write lock so queries run concurrently once a collection
/// is attached.
pub struct IndexManager<E: Embedder, S: VectorStore> {
    embedder: Mutex<E>,
    store: RwLock<S>,
    /// Collection attached on an implicit load
    collection: String,
    /// Collection currently attached, if any
    active: RwLock<Option<String>>,
    batch_size: usize,
}

impl<E: Embedder, S: VectorStore> IndexManager<E, S> {
    /// Create a manager whose implicit loads target `collection`.
    #[must_use]
    pub fn new(embedder: E, store: S, collection: impl Into<String>) -> Self {
        Self {
            embedder: Mutex::new(embedder),
            store: RwLock::new(store),
            collection: collection.into(),
            active: RwLock::new(None),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Set the embedding batch size. Zero is treated as one.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Name of the collection this manager targets.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Collection currently attached, if any.
    #[must_use]
    pub fn active_collection(&self) -> Option<String> {
        self.active.read().ok().and_then(|a| a.clone())
    }

    /// Whether the store's on-disk marker is present.
    #[must_use]
    pub fn marker_exists(&self) -> bool {
        self.store.read().is_ok_and(|s| s.marker_exists())
    }

    /// Embed `documents` and write them as `collection_id`, replacing any
    /// previous contents. The collection becomes the active one.
    ///
    /// # Errors
    /// Fails on an empty document set, on any embedding failure, or if the
    /// store rejects the write. Nothing is persisted in those cases.
    pub fn build(&self, documents: &[Document], collection_id: &str) -> Result<()> {
        if documents.is_empty() {
            return Err(Error::IndexUnavailable(format!(
                "no documents to index for collection {collection_id}"
            )));
        }

        let started = Instant::now();
        let (embeddings, model) = {
            let mut embedder = self.lock_embedder()?;
            let mut embeddings: Vec<Embedding> = Vec::with_capacity(documents.len());
            for (batch, chunk) in documents.chunks(self.batch_size).enumerate() {
                let texts: Vec<&str> = chunk.iter().map(|d| d.text.as_str()).collect();
                let vectors = embedder.embed_documents(&texts)?;
                if vectors.len() != texts.len() {
                    return Err(Error::Embedding(format!(
                        "embedder returned {} vectors for {} texts",
                        vectors.len(),
                        texts.len()
                    )));
                }
                embeddings.extend(vectors);
                debug!(collection = collection_id, batch, embedded = embeddings.len(), "embedded batch");
            }
            (embeddings, embedder.model_name().to_string())
        };

        self.store
            .write()
            .map_err(|_| Error::Store("store lock poisoned".to_string()))?
            .replace(collection_id, &model, documents, &embeddings)?;

        self.set_active(Some(collection_id));
        info!(
            collection = collection_id,
            documents = documents.len(),
            model = %model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "index built"
        );
        Ok(())
    }

    /// Attach to a persisted collection.
    ///
    /// Returns `true` only if the collection exists, holds at least one
    /// entry, and was built with the current embedder's model and
    /// dimension. Anything else leaves the manager detached.
    pub fn load(&self, collection_id: &str) -> bool {
        let info = match self.store.read() {
            Ok(store) => store.collection(collection_id),
            Err(_) => Err(Error::Store("store lock poisoned".to_string())),
        };

        let ready = match info {
            Ok(Some(info)) if info.count == 0 => {
                warn!(collection = collection_id, "collection is empty, needs rebuild");
                false
            }
            Ok(Some(info)) => match self.embedder.lock() {
                Ok(embedder) if info.model != embedder.model_name() || info.dimension != embedder.dimension() => {
                    warn!(
                        collection = collection_id,
                        stored_model = %info.model,
                        stored_dimension = info.dimension,
                        model = embedder.model_name(),
                        dimension = embedder.dimension(),
                        "collection built with a different embedding model, needs rebuild"
                    );
                    false
                }
                Ok(_) => {
                    info!(collection = collection_id, entries = info.count, "collection loaded");
                    true
                }
                Err(_) => false,
            },
            Ok(None) => {
                debug!(collection = collection_id, "collection not found");
                false
            }
            Err(e) => {
                warn!(collection = collection_id, error = %e, "failed to load collection");
                false
            }
        };

        self.set_active(ready.then_some(collection_id));
        ready
    }

    /// Return up to `top_k` documents most similar to `text`, best first.
    ///
    /// Attaches to the target collection first if nothing is attached.
    /// This is a best-effort read: any failure yields an empty result.
    pub fn query(&self, text: &str, top_k: usize) -> Vec<SearchResult> {
        let top_k = top_k.max(1);

        let collection = match self.active_collection() {
            Some(collection) => collection,
            None if self.load(&self.collection) => self.collection.clone(),
            None => {
                debug!(collection = %self.collection, "query on unavailable index");
                return Vec::new();
            }
        };

        match self.search(&collection, text, top_k) {
            Ok(results) => {
                debug!(collection = %collection, top_k, hits = results.len(), "query complete");
                results
            }
            Err(e) => {
                warn!(collection = %collection, error = %e, "query failed");
                Vec::new()
            }
        }
    }

    fn search(&self, collection: &str, text: &str, top_k: usize) -> Result<Vec<SearchResult>> {
        let query_embedding = self.lock_embedder()?.embed_query(text)?;
        self.store
            .read()
            .map_err(|_| Error::Store("store lock poisoned".to_string()))?
            .search(collection, &query_embedding, top_k)
    }

    fn lock_embedder(&self) -> Result<std::sync::MutexGuard<'_, E>> {
        self.embedder
            .lock()
            .map_err(|_| Error::Embedding("embedder lock poisoned".to_string()))
    }

    fn set_active(&self, collection: Option<&str>) {
        if let Ok(mut active) = self.active.write() {
            *active = collection.map(str::to_string);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::Metadata;
    use crate::embed::HashingEmbedder;
    use crate::store::{MemoryStore, SqliteStore};
    use proptest::prelude::*;

    fn docs(texts: &[&str]) -> Vec<Document> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| Document {
                id: format!("c:{i}"),
                text: (*t).to_string(),
                metadata: Metadata::new(),
            })
            .collect()
    }

    fn corpus() -> Vec<Document> {
        docs(&[
            "name: Intro to Rust\ncategory: Programming\nskills: ownership, borrowing",
            "name: Data Science with Python\ncategory: Data\nskills: pandas, numpy",
            "name: Watercolour Painting\ncategory: Art\nskills: brushwork, colour mixing",
            "Player Name: Jos Buttler\nSeason: 2022\nRuns: 863",
        ])
    }

    #[test]
    fn test_build_then_query_returns_own_document() {
        let index = IndexManager::new(HashingEmbedder::default(), MemoryStore::new(), "c");
        let documents = corpus();
        index.build(&documents, "c").unwrap();

        for doc in &documents {
            let results = index.query(&doc.text, 1);
            assert_eq!(results.len(), 1);
            assert_eq!(results[0].document.id, doc.id);
        }
    }

    #[test]
    fn test_build_rejects_empty() {
        let index = IndexManager::new(HashingEmbedder::default(), MemoryStore::new(), "c");
        assert!(matches!(index.build(&[], "c"), Err(Error::IndexUnavailable(_))));
        assert!(index.active_collection().is_none());
    }

    #[test]
    fn test_batches_cover_every_document() {
        let index = IndexManager::new(HashingEmbedder::new(32), MemoryStore::new(), "c").with_batch_size(3);
        let texts: Vec<String> = (0..10).map(|i| format!("document number {i}")).collect();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        index.build(&docs(&refs), "c").unwrap();

        assert_eq!(index.query("document", 100).len(), 10);
    }

    #[test]
    fn test_query_without_collection_is_empty() {
        let index = IndexManager::new(HashingEmbedder::default(), MemoryStore::new(), "missing");
        assert!(index.query("anything", 3).is_empty());
    }

    #[test]
    fn test_zero_top_k_is_clamped() {
        let index = IndexManager::new(HashingEmbedder::default(), MemoryStore::new(), "c");
        index.build(&corpus(), "c").unwrap();
        assert_eq!(index.query("rust", 0).len(), 1);
    }

    #[test]
    fn test_empty_collection_needs_rebuild() {
        let embedder = HashingEmbedder::default();
        let mut store = MemoryStore::new();
        store.replace("c", embedder.model_name(), &[], &[]).unwrap();

        let index = IndexManager::new(embedder, store, "c");
        assert!(index.marker_exists());
        assert!(!index.load("c"));
        assert!(index.query("rust", 1).is_empty());

        index.build(&corpus(), "c").unwrap();
        assert!(index.load("c"));
    }

    #[test]
    fn test_model_mismatch_needs_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        {
            let index = IndexManager::new(HashingEmbedder::new(64), SqliteStore::new(dir.path()), "c");
            index.build(&corpus(), "c").unwrap();
        }

        let index = IndexManager::new(HashingEmbedder::new(128), SqliteStore::new(dir.path()), "c");
        assert!(index.marker_exists());
        assert!(!index.load("c"));

        index.build(&corpus(), "c").unwrap();
        assert!(index.load("c"));
    }

    #[test]
    fn test_implicit_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        {
            let index = IndexManager::new(HashingEmbedder::default(), SqliteStore::new(dir.path()), "c");
            index.build(&corpus(), "c").unwrap();
        }

        let index = IndexManager::new(HashingEmbedder::default(), SqliteStore::new(dir.path()), "c");
        assert!(index.active_collection().is_none());
        let results = index.query("Watercolour Painting", 1);
        assert_eq!(results[0].document.id, "c:2");
        assert_eq!(index.active_collection().as_deref(), Some("c"));
    }

    proptest! {
        #[test]
        fn prop_query_sorted_and_bounded(query in "[a-z ]{0,40}", k in 1usize..8) {
            let index = IndexManager::new(HashingEmbedder::new(64), MemoryStore::new(), "c");
            index.build(&corpus(), "c").unwrap();

            let results = index.query(&query, k);
            prop_assert!(results.len() <= k);
            prop_assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
        }
    }
}
