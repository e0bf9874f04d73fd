//! Text embedding
//!
//! Documents and queries must go through the same [`Embedder`] (same model,
//! same normalization) or similarity scores stop meaning anything. Every
//! provider here returns L2-normalized vectors, so cosine similarity and dot
//! product agree.
//!
//! # Providers
//!
//! - [`FastEmbedder`]: ONNX sentence-transformer models via fastembed.
//!   Default `all-MiniLM-L6-v2` (384 dimensions, ~90MB download).
//! - [`HashingEmbedder`]: feature-hashed bag of words. No model, fully
//!   deterministic; meant for offline runs and tests.
//!
//! # Usage
//!
//! ```ignore
//! use askcorpus_lib::embed::{Embedder, FastEmbedder};
//!
//! let mut embedder = FastEmbedder::new("all-MiniLM-L6-v2", None)?;
//!
//! // Embed documents (for indexing)
//! let doc_embeddings = embedder.embed_documents(&["Course: Intro to Rust", "Player Name: ..."])?;
//!
//! // Embed query (for searching)
//! let query_embedding = embedder.embed_query("Which course teaches Rust?")?;
//! ```

use crate::Result;

/// A vector embedding - fixed size array of floats
pub type Embedding = Vec<f32>;

/// Trait for text embedding models
pub trait Embedder: Send + Sync {
    /// Embed multiple documents for indexing
    ///
    /// Callers bound peak memory by passing at most one batch at a time.
    fn embed_documents(&mut self, texts: &[&str]) -> Result<Vec<Embedding>>;

    /// Embed a single query for searching
    ///
    /// Note: Some models (like BGE) use different prompts for queries vs documents.
    /// This method handles that distinction.
    fn embed_query(&mut self, text: &str) -> Result<Embedding>;

    /// Returns the embedding dimension
    fn dimension(&self) -> usize;

    /// Returns the model name/identifier
    fn model_name(&self) -> &str;
}

impl<E: Embedder + ?Sized> Embedder for Box<E> {
    fn embed_documents(&mut self, texts: &[&str]) -> Result<Vec<Embedding>> {
        (**self).embed_documents(texts)
    }

    fn embed_query(&mut self, text: &str) -> Result<Embedding> {
        (**self).embed_query(text)
    }

    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }
}

/// Scale `v` to unit length in place. Zero vectors are left as they are.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

mod hashing;
mod onnx;

pub use hashing::*;
pub use onnx::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_normalize_unit_length() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero_vector() {
        let mut v = vec![0.0; 4];
        l2_normalize(&mut v);
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_boxed_embedder_delegates() {
        let mut boxed: Box<dyn Embedder> = Box::new(HashingEmbedder::new(32));
        assert_eq!(boxed.dimension(), 32);
        assert_eq!(boxed.model_name(), "hashing-32");
        assert_eq!(boxed.embed_query("hello").unwrap().len(), 32);
    }
}
