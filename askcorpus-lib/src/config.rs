//! Configuration
//!
//! Read from a TOML file (every field optional) and then overridden from
//! the environment:
//!
//! | Variable | Field |
//! |---|---|
//! | `ASKCORPUS_CORPUS_PATH` | `corpus.path` |
//! | `ASKCORPUS_PERSIST_DIR` | `index.persist_dir` |
//! | `ASKCORPUS_LLM_MODEL` | `llm.model` |
//! | `ASKCORPUS_LLM_BASE_URL` | `llm.base_url` |
//! | `PORT` | `server.port` |
//!
//! The API key itself is never stored in the file; `llm.api_key_env` names
//! the variable it is read from.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::corpus::{JsonFileSource, KeyedProfile, NormalizeOptions};
use crate::llm::{ChatCompletionsClient, DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::{Error, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub corpus: CorpusConfig,
    pub index: IndexConfig,
    pub llm: LlmConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    pub path: PathBuf,
    /// Keyed-corpus rendering profile: `generic` or `cricket`
    pub profile: String,
    pub priority_fields: Vec<String>,
    pub promoted_fields: Vec<String>,
    /// Collection name; defaults to the corpus file stem
    pub collection: Option<String>,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        let options = NormalizeOptions::default();
        Self {
            path: PathBuf::from("courses_en.json"),
            profile: "generic".to_string(),
            priority_fields: options.priority_fields,
            promoted_fields: options.promoted_fields,
            collection: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// ONNX sentence-transformer via fastembed
    Fastembed,
    /// Model-free feature hashing
    Hashing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub persist_dir: PathBuf,
    pub embedding_provider: EmbeddingProvider,
    pub embedding_model: String,
    /// Where fastembed keeps downloaded model files
    pub model_cache_dir: Option<PathBuf>,
    pub batch_size: usize,
    pub top_k: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            persist_dir: PathBuf::from("index_db"),
            embedding_provider: EmbeddingProvider::Fastembed,
            embedding_model: "all-MiniLM-L6-v2".to_string(),
            model_cache_dir: None,
            batch_size: crate::index::DEFAULT_BATCH_SIZE,
            top_k: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key_env: "GROQ_API_KEY".to_string(),
            timeout_secs: 60,
            max_tokens: 1024,
            temperature: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

impl Config {
    /// Load from `path`, falling back to defaults if the file does not
    /// exist, then apply environment overrides and validate.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the file cannot be read or parsed, or
    /// the result fails [`validate`](Self::validate).
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
            Self::from_toml(&content)?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse TOML without touching the environment.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("failed to parse config: {e}")))
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("ASKCORPUS_CORPUS_PATH") {
            self.corpus.path = PathBuf::from(v);
        }
        if let Some(v) = var("ASKCORPUS_PERSIST_DIR") {
            self.index.persist_dir = PathBuf::from(v);
        }
        if let Some(v) = var("ASKCORPUS_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = var("ASKCORPUS_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Some(port) = var("PORT").and_then(|v| v.parse().ok()) {
            self.server.port = port;
        }
    }

    /// # Errors
    /// Returns [`Error::Config`] for a zero batch size or `top_k`, an empty
    /// corpus path, or an unknown keyed profile.
    pub fn validate(&self) -> Result<()> {
        if self.corpus.path.as_os_str().is_empty() {
            return Err(Error::Config("corpus.path must not be empty".to_string()));
        }
        if self.index.batch_size == 0 {
            return Err(Error::Config("index.batch_size must be at least 1".to_string()));
        }
        if self.index.top_k == 0 {
            return Err(Error::Config("index.top_k must be at least 1".to_string()));
        }
        if KeyedProfile::by_name(&self.corpus.profile).is_none() {
            return Err(Error::Config(format!("unknown corpus profile: {}", self.corpus.profile)));
        }
        Ok(())
    }

    /// Normalizer settings from the `[corpus]` section.
    pub fn normalize_options(&self) -> Result<NormalizeOptions> {
        let profile = KeyedProfile::by_name(&self.corpus.profile)
            .ok_or_else(|| Error::Config(format!("unknown corpus profile: {}", self.corpus.profile)))?;
        Ok(NormalizeOptions {
            priority_fields: self.corpus.priority_fields.clone(),
            promoted_fields: self.corpus.promoted_fields.clone(),
            profile,
        })
    }

    /// The configured corpus file as a source.
    #[must_use]
    pub fn corpus_source(&self) -> JsonFileSource {
        let source = JsonFileSource::new(&self.corpus.path);
        match &self.corpus.collection {
            Some(collection) => source.with_collection(collection.clone()),
            None => source,
        }
    }

    /// Build the chat client, reading the API key from `llm.api_key_env`.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the key variable is unset or empty.
    pub fn chat_client(&self) -> Result<ChatCompletionsClient> {
        let api_key = std::env::var(&self.llm.api_key_env)
            .map_err(|_| Error::Config(format!("{} is not set", self.llm.api_key_env)))?;
        Ok(ChatCompletionsClient::new(
            &self.llm.base_url,
            api_key,
            &self.llm.model,
            Duration::from_secs(self.llm.timeout_secs),
        )?
        .with_max_tokens(self.llm.max_tokens)
        .with_temperature(self.llm.temperature))
    }
}
