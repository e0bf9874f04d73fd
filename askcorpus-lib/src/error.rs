//! Error types for askcorpus

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for askcorpus operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in askcorpus operations
#[derive(Error, Debug)]
pub enum Error {
    /// The corpus file does not exist
    #[error("corpus not found: {}", .0.display())]
    CorpusNotFound(PathBuf),

    /// The corpus file is not valid JSON, even after the forgiving parse
    #[error("failed to parse corpus {}: {message}", path.display())]
    CorpusParse { path: PathBuf, message: String },

    /// The corpus parsed but has an unsupported top-level shape
    #[error("unsupported corpus format: {0}")]
    CorpusFormat(String),

    /// The vector index could not be built or loaded
    #[error("index unavailable: {0}")]
    IndexUnavailable(String),

    /// The question was blank after trimming
    #[error("empty question")]
    EmptyQuestion,

    /// The language model call failed
    #[error("generation error: {0}")]
    Generation(String),

    /// Failed to load or run the embedding model
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Failed to store or retrieve from vector store
    #[error("store error: {0}")]
    Store(String),

    /// Invalid or unreadable configuration
    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Store(e.to_string())
    }
}

impl Error {
    /// Fixed text that is safe to show to an end user.
    ///
    /// Internal details stay in the logs; callers at the request boundary
    /// should return this instead of the `Display` form.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Error::EmptyQuestion => "Please provide a question.",
            Error::Generation(_) => {
                "Sorry, an answer could not be generated right now. Please try again."
            }
            Error::CorpusNotFound(_)
            | Error::CorpusParse { .. }
            | Error::CorpusFormat(_)
            | Error::IndexUnavailable(_) => {
                "The knowledge base is not ready yet. Please try again later."
            }
            _ => "Something went wrong while answering your question.",
        }
    }

    /// Whether this error was caused by the caller's input rather than the service.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::EmptyQuestion)
    }
}
