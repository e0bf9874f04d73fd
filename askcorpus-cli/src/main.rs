//! AskCorpus CLI - build, query and serve a question-answering index
//!
//! # Commands
//!
//! ```bash
//! # Show the documents a corpus normalizes to
//! askcorpus normalize courses_en.json
//!
//! # Rebuild the index from the configured corpus
//! askcorpus build
//!
//! # Raw similarity search, no language model
//! askcorpus query "machine learning" -k 3
//!
//! # Full retrieval-augmented answer
//! askcorpus ask "Which course teaches Rust?"
//!
//! # HTTP API on $PORT (default 5000)
//! askcorpus serve
//! ```

mod handlers;
mod router;
mod server;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use askcorpus_lib::{
    config::{Config, EmbeddingProvider},
    corpus::{CorpusSource, JsonFileSource, Normalizer},
    embed::{Embedder, FastEmbedder, HashingEmbedder},
    index::IndexManager,
    llm::ChatCompletionsClient,
    responder::{Assistant, Responder},
    store::SqliteStore,
};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "askcorpus")]
#[command(about = "Ask questions over a JSON record corpus")]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "askcorpus.toml", global = true)]
    config: PathBuf,

    /// Corpus file, overriding the configured one
    #[arg(long, global = true)]
    corpus: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the documents a corpus file normalizes to
    Normalize {
        /// Corpus file (defaults to the configured corpus)
        input: Option<PathBuf>,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Rebuild the index for the configured corpus
    Build,

    /// Similarity search without generation
    Query {
        /// Search text
        text: String,

        /// Number of results to return
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// Answer a question from the corpus
    Ask {
        /// The question
        question: String,

        /// Number of documents to ground the answer in
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// Run the HTTP API
    Serve,
}

fn make_embedder(config: &Config) -> Result<Box<dyn Embedder>> {
    Ok(match config.index.embedding_provider {
        EmbeddingProvider::Fastembed => {
            tracing::info!(model = %config.index.embedding_model, "loading embedding model (first run downloads it)");
            Box::new(FastEmbedder::new(
                &config.index.embedding_model,
                config.index.model_cache_dir.clone(),
            )?)
        }
        EmbeddingProvider::Hashing => Box::new(HashingEmbedder::default()),
    })
}

fn make_index(config: &Config, source: &dyn CorpusSource) -> Result<IndexManager<Box<dyn Embedder>, SqliteStore>> {
    Ok(IndexManager::new(
        make_embedder(config)?,
        SqliteStore::new(&config.index.persist_dir),
        source.collection_id(),
    )
    .with_batch_size(config.index.batch_size))
}

fn make_responder(config: &Config) -> Result<Responder<Box<dyn Embedder>, SqliteStore, ChatCompletionsClient>> {
    let generator = config.chat_client()?;
    Ok(Responder::new(
        Box::new(config.corpus_source()),
        Normalizer::new(config.normalize_options()?),
        make_embedder(config)?,
        SqliteStore::new(&config.index.persist_dir),
        generator,
    )
    .with_batch_size(config.index.batch_size))
}

fn preview(text: &str, max: usize) -> String {
    let mut out: String = text.chars().take(max).collect();
    if text.chars().count() > max {
        out.push_str("...");
    }
    out
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(&cli.config).with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(corpus) = cli.corpus {
        config.corpus.path = corpus;
    }

    match cli.command {
        Commands::Normalize { input, json } => {
            let source = match input {
                Some(path) => JsonFileSource::new(path),
                None => config.corpus_source(),
            };
            let normalizer = Normalizer::new(config.normalize_options()?);
            let documents = normalizer.ingest(&source)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&documents)?);
            } else {
                println!("{} documents in collection '{}':\n", documents.len(), source.collection_id());
                for doc in &documents {
                    println!("--- {} ---", doc.id);
                    println!("{}\n", preview(&doc.text, 400));
                }
            }
        }

        Commands::Build => {
            let source = config.corpus_source();
            let normalizer = Normalizer::new(config.normalize_options()?);
            let documents = normalizer.ingest(&source)?;
            anyhow::ensure!(!documents.is_empty(), "corpus {} produced no documents", config.corpus.path.display());

            let index = make_index(&config, &source)?;
            index.build(&documents, index.collection())?;
            println!(
                "Indexed {} documents into '{}' under {}",
                documents.len(),
                index.collection(),
                config.index.persist_dir.display()
            );
        }

        Commands::Query { text, k } => {
            let source = config.corpus_source();
            let index = make_index(&config, &source)?;
            let results = index.query(&text, k.unwrap_or(config.index.top_k));

            if results.is_empty() {
                println!("No results. Has the index been built? Try `askcorpus build`.");
            }
            for (i, result) in results.iter().enumerate() {
                println!("#{} (score: {:.4}, id: {})", i + 1, result.score, result.document.id);
                println!("---");
                println!("{}\n", preview(&result.document.text, 300));
            }
        }

        Commands::Ask { question, k } => {
            let responder = make_responder(&config)?;
            responder.ensure_ready()?;
            match responder.answer(&question, k.unwrap_or(config.index.top_k)) {
                Ok(answer) => println!("{answer}"),
                Err(e) => {
                    tracing::error!(error = %e, "could not answer");
                    println!("{}", e.user_message());
                }
            }
        }

        Commands::Serve => {
            let assistant: Arc<dyn Assistant> = Arc::new(make_responder(&config)?);
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(server::serve(
                Arc::clone(&assistant),
                config.index.top_k,
                &config.server.bind,
                config.server.port,
            ))?;
            // the blocking HTTP client inside must be dropped outside the runtime
            drop(runtime);
            drop(assistant);
        }
    }

    Ok(())
}
