use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::info;

use crate::corpus::{collection_id_for, parse_forgiving, CorpusShape, CorpusSource};
use crate::{Error, Result};

/// A corpus stored as a JSON file on disk.
///
/// The collection id is the file's base name without extension unless
/// overridden.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
    collection: Option<String>,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            collection: None,
        }
    }

    /// Store this corpus under an explicit collection name.
    #[must_use]
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CorpusSource for JsonFileSource {
    fn collection_id(&self) -> String {
        self.collection
            .clone()
            .unwrap_or_else(|| collection_id_for(&self.path))
    }

    fn load(&self) -> Result<CorpusShape> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::CorpusNotFound(self.path.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        let value = parse_forgiving(&text).map_err(|e| Error::CorpusParse {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        let shape = CorpusShape::from_value(value)?;

        info!(
            path = %self.path.display(),
            shape = match shape {
                CorpusShape::Flat(_) => "flat",
                CorpusShape::Keyed(_) => "keyed",
            },
            entries = shape.len(),
            "loaded corpus"
        );
        Ok(shape)
    }
}

/// A corpus already held in memory.
#[derive(Debug, Clone)]
pub struct ValueSource {
    collection: String,
    value: Value,
}

impl ValueSource {
    pub fn new(collection: impl Into<String>, value: Value) -> Self {
        Self {
            collection: collection.into(),
            value,
        }
    }
}

impl CorpusSource for ValueSource {
    fn collection_id(&self) -> String {
        self.collection.clone()
    }

    fn load(&self) -> Result<CorpusShape> {
        CorpusShape::from_value(self.value.clone())
    }
}
