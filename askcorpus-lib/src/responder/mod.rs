//! Retrieval-augmented answering
//!
//! [`Responder`] ties the pipeline together: it makes sure the index for
//! its corpus exists (loading it, or building it from the normalizer's
//! output), retrieves the closest documents for a question, and asks a
//! [`Generator`] to answer from that context only.
//!
//! # Usage
//!
//! ```ignore
//! use askcorpus_lib::responder::{Assistant, Responder};
//!
//! let responder = Responder::new(Box::new(source), normalizer, embedder, store, generator);
//! responder.ensure_ready()?;
//! let answer = responder.answer("Which course teaches Rust?", 1)?;
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use tracing::{error, info, warn};

use crate::corpus::{CorpusSource, Normalizer};
use crate::embed::Embedder;
use crate::index::IndexManager;
use crate::llm::Generator;
use crate::store::{SearchResult, VectorStore};
use crate::{Error, Result};

/// Returned instead of calling the model when retrieval finds nothing.
pub const NO_RELEVANT_DOCUMENTS: &str = "No relevant documents found. Please try rephrasing your question.";

/// The two calls a request boundary makes into the pipeline, plus a
/// cheap status read. Object safe so servers can hold `Arc<dyn Assistant>`.
pub trait Assistant: Send + Sync {
    /// Make the index usable. Idempotent; a failed attempt is retried on
    /// the next call.
    fn ensure_ready(&self) -> Result<()>;

    /// Whether a previous [`ensure_ready`](Self::ensure_ready) succeeded.
    fn is_ready(&self) -> bool;

    /// Answer `question` from the `top_k` most relevant documents.
    fn answer(&self, question: &str, top_k: usize) -> Result<String>;
}

/// Retrieval-augmented responder over one corpus.
pub struct Responder<E: Embedder, S: VectorStore, G: Generator> {
    source: Box<dyn CorpusSource>,
    normalizer: Normalizer,
    index: IndexManager<E, S>,
    generator: G,
    init: Mutex<()>,
    ready: AtomicBool,
}

impl<E: Embedder, S: VectorStore, G: Generator> Responder<E, S, G> {
    /// Create a responder. The index collection is named after the source.
    pub fn new(source: Box<dyn CorpusSource>, normalizer: Normalizer, embedder: E, store: S, generator: G) -> Self {
        let index = IndexManager::new(embedder, store, source.collection_id());
        Self {
            source,
            normalizer,
            index,
            generator,
            init: Mutex::new(()),
            ready: AtomicBool::new(false),
        }
    }

    /// Set the embedding batch size used when building.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.index = self.index.with_batch_size(batch_size);
        self
    }

    #[must_use]
    pub fn index(&self) -> &IndexManager<E, S> {
        &self.index
    }

    #[must_use]
    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Ingest the corpus and rebuild its collection unconditionally.
    ///
    /// Returns the number of documents indexed.
    ///
    /// # Errors
    /// Corpus parse/format errors are returned as-is. An empty corpus and
    /// any embedding or storage failure are [`Error::IndexUnavailable`].
    pub fn rebuild(&self) -> Result<usize> {
        let _guard = self.lock_init()?;
        self.ready.store(false, Ordering::Release);
        let count = self.build_from_source()?;
        self.ready.store(true, Ordering::Release);
        Ok(count)
    }

    /// Raw retrieval, without generation. Best effort like
    /// [`IndexManager::query`].
    pub fn retrieve(&self, question: &str, top_k: usize) -> Vec<SearchResult> {
        self.index.query(question, top_k)
    }

    fn build_from_source(&self) -> Result<usize> {
        let collection = self.index.collection().to_string();
        let documents = self.normalizer.ingest(self.source.as_ref())?;
        if documents.is_empty() {
            return Err(Error::IndexUnavailable(format!("corpus for {collection} has no documents")));
        }

        self.index.build(&documents, &collection).map_err(|e| match e {
            Error::IndexUnavailable(_) => e,
            other => Error::IndexUnavailable(other.to_string()),
        })?;
        Ok(documents.len())
    }

    fn lock_init(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.init
            .lock()
            .map_err(|_| Error::IndexUnavailable("initialization lock poisoned".to_string()))
    }
}

impl<E: Embedder, S: VectorStore, G: Generator> Assistant for Responder<E, S, G> {
    fn ensure_ready(&self) -> Result<()> {
        if self.ready.load(Ordering::Acquire) {
            return Ok(());
        }

        let _guard = self.lock_init()?;
        // another caller may have finished while we waited
        if self.ready.load(Ordering::Acquire) {
            return Ok(());
        }

        let started = Instant::now();
        let collection = self.index.collection().to_string();

        if self.index.marker_exists() && self.index.load(&collection) {
            info!(collection = %collection, "using existing index");
        } else {
            info!(collection = %collection, "building index from corpus");
            match self.build_from_source() {
                Ok(documents) => info!(collection = %collection, documents, "index ready"),
                Err(e) => {
                    error!(collection = %collection, error = %e, "index initialization failed");
                    return Err(e);
                }
            }
        }

        self.ready.store(true, Ordering::Release);
        info!(
            collection = %collection,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "responder initialized"
        );
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    fn answer(&self, question: &str, top_k: usize) -> Result<String> {
        let question = question.trim();
        if question.is_empty() {
            return Err(Error::EmptyQuestion);
        }

        self.ensure_ready()?;

        let results = self.index.query(question, top_k);
        if results.is_empty() {
            warn!(top_k, "no documents retrieved");
            return Ok(NO_RELEVANT_DOCUMENTS.to_string());
        }

        let context = results
            .iter()
            .map(|r| r.document.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = build_prompt(question, &context);

        self.generator.generate(&prompt).map_err(|e| {
            error!(error = %e, "answer generation failed");
            match e {
                Error::Generation(_) => e,
                other => Error::Generation(other.to_string()),
            }
        })
    }
}

/// Render the grounding prompt for `question` over `context`.
#[must_use]
pub fn build_prompt(question: &str, context: &str) -> String {
    format!(
        "You are a helpful assistant. Answer the following question using ONLY the provided context data.

Question: {question}

Context Data:
{context}

Instructions:
1. Extract ALL relevant information from the context to answer the question
2. Provide a clear, detailed answer in natural, conversational paragraphs
3. Write in flowing paragraphs, not bullet points or structured blocks
4. Use natural transitions between sentences and ideas
5. Be specific and accurate - only use information from the provided context
6. If comparing items, provide information for ALL items mentioned in a natural narrative style
7. If the context doesn't contain enough information to answer the question, say so

Answer in natural paragraphs:"
    )
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::corpus::{CorpusShape, ValueSource};
    use crate::embed::HashingEmbedder;
    use crate::llm::RecordingGenerator;
    use crate::store::{MemoryStore, SqliteStore};

    fn courses() -> serde_json::Value {
        json!([
            {"name": "Intro to Rust", "category": "Programming", "skills": ["ownership", "borrowing"]},
            {"name": "Watercolour Painting", "category": "Art", "skills": ["brushwork"]},
            {"name": "Data Science with Python", "category": "Data", "skills": ["pandas"]}
        ])
    }

    /// Source that counts how often it is loaded.
    struct CountingSource {
        inner: ValueSource,
        loads: Arc<AtomicUsize>,
    }

    impl CorpusSource for CountingSource {
        fn collection_id(&self) -> String {
            self.inner.collection_id()
        }

        fn load(&self) -> Result<CorpusShape> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            self.inner.load()
        }
    }

    fn responder(
        value: serde_json::Value,
        generator: RecordingGenerator,
    ) -> (Responder<HashingEmbedder, MemoryStore, RecordingGenerator>, Arc<AtomicUsize>) {
        let loads = Arc::new(AtomicUsize::new(0));
        let source = CountingSource {
            inner: ValueSource::new("courses", value),
            loads: Arc::clone(&loads),
        };
        let responder = Responder::new(
            Box::new(source),
            Normalizer::default(),
            HashingEmbedder::default(),
            MemoryStore::new(),
            generator,
        );
        (responder, loads)
    }

    #[test]
    fn test_ensure_ready_is_idempotent() {
        let (responder, loads) = responder(courses(), RecordingGenerator::default());
        assert!(!responder.is_ready());

        responder.ensure_ready().unwrap();
        let first = responder.retrieve("Intro to Rust", 1);
        responder.ensure_ready().unwrap();

        assert!(responder.is_ready());
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(responder.retrieve("Intro to Rust", 1)[0].document.id, first[0].document.id);
    }

    #[test]
    fn test_concurrent_ensure_ready_builds_once() {
        let (responder, loads) = responder(courses(), RecordingGenerator::default());
        let responder = Arc::new(responder);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let r = Arc::clone(&responder);
                std::thread::spawn(move || r.ensure_ready())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_blank_question_skips_model() {
        let generator = RecordingGenerator::default();
        let (responder, _) = responder(courses(), generator.clone());

        assert!(matches!(responder.answer("", 1), Err(Error::EmptyQuestion)));
        assert!(matches!(responder.answer("   ", 1), Err(Error::EmptyQuestion)));
        assert_eq!(generator.calls(), 0);
    }

    #[test]
    fn test_answer_grounds_prompt_in_retrieved_text() {
        let generator = RecordingGenerator::new("Intro to Rust covers ownership.");
        let (responder, _) = responder(courses(), generator.clone());

        let answer = responder.answer("  Intro to Rust  ", 1).unwrap();
        assert_eq!(answer, "Intro to Rust covers ownership.");

        let prompts = generator.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Question: Intro to Rust\n"));
        assert!(prompts[0].contains("name: Intro to Rust"));
        assert!(!prompts[0].contains("Watercolour"));
    }

    #[test]
    fn test_context_joins_results_in_rank_order() {
        let generator = RecordingGenerator::default();
        let (responder, _) = responder(courses(), generator.clone());

        responder.answer("Intro to Rust", 2).unwrap();
        let results = responder.retrieve("Intro to Rust", 2);
        let expected = format!("{}\n\n{}", results[0].document.text, results[1].document.text);
        assert!(generator.prompts()[0].contains(&expected));
    }

    /// Embeds documents normally but cannot embed queries.
    struct NoQueryEmbedder(HashingEmbedder);

    impl Embedder for NoQueryEmbedder {
        fn embed_documents(&mut self, texts: &[&str]) -> Result<Vec<crate::embed::Embedding>> {
            self.0.embed_documents(texts)
        }

        fn embed_query(&mut self, _text: &str) -> Result<crate::embed::Embedding> {
            Err(Error::Embedding("query embedding unavailable".to_string()))
        }

        fn dimension(&self) -> usize {
            self.0.dimension()
        }

        fn model_name(&self) -> &str {
            self.0.model_name()
        }
    }

    #[test]
    fn test_no_results_skips_model() {
        let generator = RecordingGenerator::default();
        let responder = Responder::new(
            Box::new(ValueSource::new("courses", courses())),
            Normalizer::default(),
            NoQueryEmbedder(HashingEmbedder::default()),
            MemoryStore::new(),
            generator.clone(),
        );

        assert_eq!(responder.answer("Intro to Rust", 1).unwrap(), NO_RELEVANT_DOCUMENTS);
        assert!(responder.is_ready());
        assert_eq!(generator.calls(), 0);
    }

    #[test]
    fn test_generation_failure_surfaces() {
        let (responder, _) = responder(courses(), RecordingGenerator::failing());
        let err = responder.answer("Intro to Rust", 1).unwrap_err();
        assert!(matches!(err, Error::Generation(_)));
        assert!(responder.is_ready());
    }

    #[test]
    fn test_empty_corpus_is_not_ready_and_retries() {
        let (responder, loads) = responder(json!([]), RecordingGenerator::default());

        assert!(matches!(responder.ensure_ready(), Err(Error::IndexUnavailable(_))));
        assert!(!responder.is_ready());
        assert!(responder.ensure_ready().is_err());
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_parse_error_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{\"a\": [1, 2").unwrap();

        let responder = Responder::new(
            Box::new(crate::corpus::JsonFileSource::new(&path)),
            Normalizer::default(),
            HashingEmbedder::default(),
            MemoryStore::new(),
            RecordingGenerator::default(),
        );
        assert!(matches!(responder.ensure_ready(), Err(Error::CorpusParse { .. })));
        assert!(!responder.is_ready());
    }

    fn sqlite_responder(
        dir: &std::path::Path,
    ) -> (Responder<HashingEmbedder, SqliteStore, RecordingGenerator>, Arc<AtomicUsize>) {
        let loads = Arc::new(AtomicUsize::new(0));
        let source = CountingSource {
            inner: ValueSource::new("courses", courses()),
            loads: Arc::clone(&loads),
        };
        let responder = Responder::new(
            Box::new(source),
            Normalizer::default(),
            HashingEmbedder::default(),
            SqliteStore::new(dir),
            RecordingGenerator::default(),
        );
        (responder, loads)
    }

    #[test]
    fn test_persisted_index_is_reused() {
        let dir = tempfile::tempdir().unwrap();

        let (first, first_loads) = sqlite_responder(dir.path());
        first.ensure_ready().unwrap();
        assert_eq!(first_loads.load(Ordering::SeqCst), 1);

        let (second, second_loads) = sqlite_responder(dir.path());
        second.ensure_ready().unwrap();
        assert_eq!(second_loads.load(Ordering::SeqCst), 0);
        assert_eq!(second.retrieve("Watercolour Painting", 1)[0].document.id, "courses:1");
    }

    #[test]
    fn test_empty_persisted_collection_is_rebuilt() {
        let dir = tempfile::tempdir().unwrap();
        let model = HashingEmbedder::default().model_name().to_string();
        SqliteStore::new(dir.path()).replace("courses", &model, &[], &[]).unwrap();

        let (responder, loads) = sqlite_responder(dir.path());
        responder.ensure_ready().unwrap();

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(responder.is_ready());
        let results = responder.retrieve("Data Science with Python", 1);
        assert_eq!(results[0].document.id, "courses:2");
    }

    #[test]
    fn test_corrupt_persisted_index_is_rebuilt() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(crate::store::DB_FILE_NAME), b"\x00\x01 garbage, not sqlite").unwrap();

        let (responder, loads) = sqlite_responder(dir.path());
        responder.ensure_ready().unwrap();
        responder.ensure_ready().unwrap();

        assert!(responder.is_ready());
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(responder.retrieve("Intro to Rust", 1)[0].document.id, "courses:0");

        // a fresh process finds the rebuilt index
        let (again, again_loads) = sqlite_responder(dir.path());
        again.ensure_ready().unwrap();
        assert_eq!(again_loads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_rebuild_reingests() {
        let (responder, loads) = responder(courses(), RecordingGenerator::default());
        responder.ensure_ready().unwrap();
        assert_eq!(responder.rebuild().unwrap(), 3);
        assert_eq!(loads.load(Ordering::SeqCst), 2);
        assert!(responder.is_ready());
    }

    #[test]
    fn test_prompt_template() {
        let prompt = build_prompt("Who?", "ctx one\n\nctx two");
        assert!(prompt.starts_with("You are a helpful assistant."));
        assert!(prompt.contains("using ONLY the provided context"));
        assert!(prompt.contains("Context Data:\nctx one\n\nctx two\n"));
        assert!(prompt.ends_with("Answer in natural paragraphs:"));
    }
}
