//! AskCorpus - question answering over JSON record corpora
//!
//! # Architecture
//!
//! ```text
//! Corpus file -> Normalizer -> Documents -> Embedder -> Store
//!                                                         |
//! Question -> Embedder -> IndexManager::query <-----------+
//!                              |
//!                         top-k context -> prompt -> Generator -> answer
//! ```
//!
//! # Example
//!
//! ```ignore
//! use askcorpus_lib::{
//!     corpus::{JsonFileSource, Normalizer},
//!     embed::FastEmbedder,
//!     llm::ChatCompletionsClient,
//!     responder::{Assistant, Responder},
//!     store::SqliteStore,
//! };
//!
//! let responder = Responder::new(
//!     Box::new(JsonFileSource::new("courses_en.json")),
//!     Normalizer::default(),
//!     FastEmbedder::new("all-MiniLM-L6-v2", None)?,
//!     SqliteStore::new("index_db"),
//!     client,
//! );
//!
//! // Build or load the index once
//! responder.ensure_ready()?;
//!
//! // Answer from the single best match
//! let answer = responder.answer("Which course teaches Rust?", 1)?;
//! ```

pub mod config;
pub mod corpus;
pub mod embed;
pub mod error;
pub mod index;
pub mod llm;
pub mod names;
pub mod responder;
pub mod store;

pub use error::{Error, Result};
