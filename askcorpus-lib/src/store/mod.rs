//! Vector storage backends
//!
//! A store holds any number of named collections. A collection is written
//! in one piece by [`VectorStore::replace`] and is read-only afterwards;
//! updating it means rebuilding it.
//!
//! # Storage Model
//!
//! Each stored entry consists of:
//! - Document: the text and metadata
//! - Embedding: the vector representation
//!
//! Each collection also records the embedding model and dimension it was
//! built with, so readers can refuse a collection from a different
//! embedding space.
//!
//! # Backends
//!
//! - [`MemoryStore`]: process memory, for tests and one-off runs
//! - [`SqliteStore`]: one SQLite file under a persist directory
//!
//! # Usage
//!
//! ```ignore
//! use askcorpus_lib::store::{VectorStore, SqliteStore};
//!
//! let mut store = SqliteStore::new("index_db");
//!
//! // Write a whole collection
//! store.replace("courses_en", "all-MiniLM-L6-v2", &documents, &embeddings)?;
//!
//! // Search by vector similarity
//! let results = store.search("courses_en", &query_embedding, 5)?;
//! ```

use crate::corpus::Document;
use crate::embed::Embedding;
use crate::Result;

/// A search result with similarity score
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// The matched document
    pub document: Document,
    /// Cosine similarity (higher is more similar), -1.0 to 1.0
    pub score: f32,
}

impl PartialOrd for SearchResult {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SearchResult {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.score.total_cmp(&other.score)
    }
}

impl PartialEq for SearchResult {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for SearchResult {}

/// What a store knows about one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionInfo {
    pub name: String,
    /// Embedding model the collection was built with
    pub model: String,
    /// Embedding dimension
    pub dimension: usize,
    /// Number of stored entries
    pub count: usize,
}

/// Trait for vector storage backends
pub trait VectorStore: Send + Sync {
    /// Replace a collection with the given documents and embeddings.
    ///
    /// Either the whole collection is written or, on error, the previous
    /// contents (if any) are left in place.
    ///
    /// # Arguments
    /// * `collection` - Collection name
    /// * `model` - Name of the embedding model that produced `embeddings`
    /// * `documents` - The documents to store
    /// * `embeddings` - Corresponding embeddings (must be same length)
    fn replace(
        &mut self,
        collection: &str,
        model: &str,
        documents: &[Document],
        embeddings: &[Embedding],
    ) -> Result<()>;

    /// Look up a collection. `None` if it was never built.
    fn collection(&self, name: &str) -> Result<Option<CollectionInfo>>;

    /// Search a collection for similar documents
    ///
    /// # Arguments
    /// * `collection` - Collection name
    /// * `query_embedding` - The query vector
    /// * `k` - Number of results to return
    ///
    /// # Returns
    /// Top-k results sorted by similarity (highest first). Empty if the
    /// collection does not exist.
    fn search(&self, collection: &str, query_embedding: &Embedding, k: usize) -> Result<Vec<SearchResult>>;

    /// Remove a collection and its entries.
    fn drop_collection(&mut self, name: &str) -> Result<()>;

    /// Whether the store's durable marker is present.
    ///
    /// Cheap check used to decide between loading and building before any
    /// collection is opened.
    fn marker_exists(&self) -> bool;
}

/// Check the inputs to [`VectorStore::replace`] and return the common dimension.
pub(crate) fn check_batch(documents: &[Document], embeddings: &[Embedding]) -> Result<usize> {
    if documents.len() != embeddings.len() {
        return Err(crate::Error::Store(format!(
            "{} documents but {} embeddings",
            documents.len(),
            embeddings.len()
        )));
    }
    let dimension = embeddings.first().map_or(0, Vec::len);
    if let Some(bad) = embeddings.iter().find(|e| e.len() != dimension) {
        return Err(crate::Error::Store(format!(
            "mixed embedding dimensions: {dimension} and {}",
            bad.len()
        )));
    }
    Ok(dimension)
}

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 means identical direction, and 0 for
/// mismatched lengths or zero vectors.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Order scored results best first and keep the top `k`.
///
/// The sort is stable: equal scores stay in insertion order.
pub(crate) fn rank(mut results: Vec<SearchResult>, k: usize) -> Vec<SearchResult> {
    results.sort_by(|a, b| b.score.total_cmp(&a.score));
    results.truncate(k);
    results
}

mod memory;
mod sqlite;

pub use memory::*;
pub use sqlite::*;
