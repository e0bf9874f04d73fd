use std::path::PathBuf;

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tracing::info;

use crate::embed::{l2_normalize, Embedder, Embedding};
use crate::{Error, Result};

/// Sentence-transformer models this crate knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelChoice {
    /// sentence-transformers/all-MiniLM-L6-v2, 384 dimensions
    AllMiniLmL6V2,
    /// BAAI/bge-small-en-v1.5, 384 dimensions
    BgeSmallEnV15,
    /// BAAI/bge-base-en-v1.5, 768 dimensions
    BgeBaseEnV15,
    /// BAAI/bge-large-en-v1.5, 1024 dimensions
    BgeLargeEnV15,
}

impl ModelChoice {
    /// Resolve a configured model name. Accepts names with or without the
    /// hub organisation prefix.
    ///
    /// # Errors
    /// Returns [`Error::Config`] for an unknown model.
    pub fn from_name(name: &str) -> Result<Self> {
        let short = name.rsplit('/').next().unwrap_or(name).to_lowercase();
        match short.as_str() {
            "all-minilm-l6-v2" => Ok(Self::AllMiniLmL6V2),
            "bge-small-en-v1.5" => Ok(Self::BgeSmallEnV15),
            "bge-base-en-v1.5" => Ok(Self::BgeBaseEnV15),
            "bge-large-en-v1.5" => Ok(Self::BgeLargeEnV15),
            _ => Err(Error::Config(format!("unsupported embedding model: {name}"))),
        }
    }

    #[must_use]
    pub fn model_name(self) -> &'static str {
        match self {
            Self::AllMiniLmL6V2 => "sentence-transformers/all-MiniLM-L6-v2",
            Self::BgeSmallEnV15 => "BAAI/bge-small-en-v1.5",
            Self::BgeBaseEnV15 => "BAAI/bge-base-en-v1.5",
            Self::BgeLargeEnV15 => "BAAI/bge-large-en-v1.5",
        }
    }

    #[must_use]
    pub fn dimension(self) -> usize {
        match self {
            Self::AllMiniLmL6V2 | Self::BgeSmallEnV15 => 384,
            Self::BgeBaseEnV15 => 768,
            Self::BgeLargeEnV15 => 1024,
        }
    }

    /// BGE models expect an instruction prefix on queries.
    #[must_use]
    pub fn query_prefix(self) -> Option<&'static str> {
        match self {
            Self::AllMiniLmL6V2 => None,
            _ => Some("Represent this sentence for searching relevant passages: "),
        }
    }

    fn fastembed_model(self) -> EmbeddingModel {
        match self {
            Self::AllMiniLmL6V2 => EmbeddingModel::AllMiniLML6V2,
            Self::BgeSmallEnV15 => EmbeddingModel::BGESmallENV15,
            Self::BgeBaseEnV15 => EmbeddingModel::BGEBaseENV15,
            Self::BgeLargeEnV15 => EmbeddingModel::BGELargeENV15,
        }
    }
}

/// Local ONNX embedder backed by fastembed.
///
/// Runs on CPU. Outputs are L2-normalized.
pub struct FastEmbedder {
    model: TextEmbedding,
    choice: ModelChoice,
}

impl FastEmbedder {
    /// Load a model by name, downloading it on first use.
    ///
    /// `cache_dir` overrides where model files are kept.
    pub fn new(model_name: &str, cache_dir: Option<PathBuf>) -> Result<Self> {
        let choice = ModelChoice::from_name(model_name)?;
        let mut opts = InitOptions::new(choice.fastembed_model()).with_show_download_progress(true);
        if let Some(dir) = cache_dir {
            opts = opts.with_cache_dir(dir);
        }

        let model = TextEmbedding::try_new(opts).map_err(|e| Error::Embedding(e.to_string()))?;
        info!(model = choice.model_name(), dimension = choice.dimension(), "loaded embedding model");
        Ok(Self { model, choice })
    }
}

impl Embedder for FastEmbedder {
    fn model_name(&self) -> &str {
        self.choice.model_name()
    }

    fn dimension(&self) -> usize {
        self.choice.dimension()
    }

    fn embed_documents(&mut self, texts: &[&str]) -> Result<Vec<Embedding>> {
        let mut embeddings = self
            .model
            .embed(texts, Some(texts.len().max(1)))
            .map_err(|e| Error::Embedding(e.to_string()))?;
        for v in &mut embeddings {
            l2_normalize(v);
        }
        Ok(embeddings)
    }

    fn embed_query(&mut self, text: &str) -> Result<Embedding> {
        let query_text = match self.choice.query_prefix() {
            Some(prefix) => format!("{prefix}{text}"),
            None => text.to_string(),
        };

        let mut embedding = self
            .model
            .embed(vec![query_text], None)
            .map_err(|e| Error::Embedding(e.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("model returned no embeddings".to_string()))?;
        l2_normalize(&mut embedding);
        Ok(embedding)
    }
}
