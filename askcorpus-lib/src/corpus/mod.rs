//! Corpus ingestion: raw JSON records into searchable documents
//!
//! Two corpus shapes are understood:
//! - Flat: a top-level array, one record (object) per element. Course
//!   catalogs look like this.
//! - Keyed: a top-level object keyed by entity. Each entity is either a
//!   per-period mapping (season-keyed sports stats), a plain record, or a
//!   scalar value.
//!
//! # Usage
//!
//! ```ignore
//! use askcorpus_lib::corpus::{JsonFileSource, Normalizer, NormalizeOptions};
//!
//! let source = JsonFileSource::new("courses_en.json");
//! let normalizer = Normalizer::new(NormalizeOptions::default());
//! let documents = normalizer.ingest(&source)?;
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::{Error, Result};

/// Longest string value (in chars) kept in document metadata.
pub const MAX_METADATA_CHARS: usize = 512;

/// Collection name used when a source path has no usable file stem.
pub const DEFAULT_COLLECTION: &str = "rag_documents";

/// The atomic retrievable unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Identifier, unique within a collection
    pub id: String,
    /// Flattened text that gets embedded and handed to the model as context
    pub text: String,
    /// Small set of scalar fields describing the source record
    pub metadata: Metadata,
}

/// A scalar metadata value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl MetaValue {
    /// Convert a JSON value, serializing arrays and objects to compact text.
    /// `null` has no metadata form.
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => Some(match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or_default()),
            }),
            Value::String(s) => Some(Self::Str(s.clone())),
            Value::Array(_) | Value::Object(_) => Some(Self::Str(value.to_string())),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for MetaValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for MetaValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for MetaValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<usize> for MetaValue {
    fn from(i: usize) -> Self {
        Self::Int(i64::try_from(i).unwrap_or(i64::MAX))
    }
}

impl From<f64> for MetaValue {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

/// Document metadata. Values are scalars; strings are capped at
/// [`MAX_METADATA_CHARS`] on insertion.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, MetaValue>);

impl Metadata {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<MetaValue>) {
        let value = match value.into() {
            MetaValue::Str(s) => MetaValue::Str(truncate_chars(s, MAX_METADATA_CHARS)),
            other => other,
        };
        self.0.insert(key.into(), value);
    }

    /// Insert a JSON value, skipping `null`.
    pub fn insert_json(&mut self, key: impl Into<String>, value: &Value) {
        if let Some(v) = MetaValue::from_json(value) {
            self.insert(key, v);
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.0.get(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetaValue)> {
        self.0.iter()
    }
}

fn truncate_chars(s: String, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((cut, _)) => {
            let mut t = s[..cut].to_string();
            t.push('…');
            t
        }
        None => s,
    }
}

/// Top-level shape of a parsed corpus, decided once at load time.
#[derive(Debug, Clone, PartialEq)]
pub enum CorpusShape {
    /// Array of records
    Flat(Vec<Value>),
    /// Entity id to record, per-period mapping, or scalar
    Keyed(Map<String, Value>),
}

impl CorpusShape {
    /// Classify a parsed JSON document.
    ///
    /// # Errors
    /// Returns [`Error::CorpusFormat`] if the top level is neither an array
    /// nor an object.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Array(items) => Ok(Self::Flat(items)),
            Value::Object(map) => Ok(Self::Keyed(map)),
            other => Err(Error::CorpusFormat(format!(
                "expected a JSON array or object at the top level, found {}",
                json_type_name(&other)
            ))),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Flat(items) => items.len(),
            Self::Keyed(map) => map.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Anything that can produce a raw corpus.
pub trait CorpusSource: Send + Sync {
    /// Name of the index collection this corpus is stored under.
    ///
    /// Must be stable for the same source so re-ingestion reuses the
    /// same collection.
    fn collection_id(&self) -> String;

    /// Load and classify the raw corpus.
    fn load(&self) -> Result<CorpusShape>;
}

/// Derive a collection name from a corpus file path: its base name without
/// extension. `data/courses_en.json` becomes `courses_en`.
#[must_use]
pub fn collection_id_for(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| DEFAULT_COLLECTION.to_string())
}

/// Settings that shape how records become documents.
#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    /// Flat-mode fields emitted first, in this order
    pub priority_fields: Vec<String>,
    /// Flat-mode fields copied into metadata when present
    pub promoted_fields: Vec<String>,
    /// Rendering rules for season-keyed entities
    pub profile: KeyedProfile,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            priority_fields: ["name", "content", "what_you_learn", "skills", "category"]
                .into_iter()
                .map(String::from)
                .collect(),
            promoted_fields: ["name", "category", "url"]
                .into_iter()
                .map(String::from)
                .collect(),
            profile: KeyedProfile::default(),
        }
    }
}

/// Turns raw corpora into [`Document`]s.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    options: NormalizeOptions,
}

impl Normalizer {
    #[must_use]
    pub fn new(options: NormalizeOptions) -> Self {
        Self { options }
    }

    #[must_use]
    pub fn options(&self) -> &NormalizeOptions {
        &self.options
    }

    /// Normalize an already-classified corpus.
    ///
    /// Document ids are `<collection>:<ordinal>` in emission order.
    #[must_use]
    pub fn normalize(&self, shape: CorpusShape, collection: &str) -> Vec<Document> {
        let mut documents = match shape {
            CorpusShape::Flat(items) => {
                info!(collection, records = items.len(), "normalizing flat corpus");
                normalize_flat(&items, collection, &self.options)
            }
            CorpusShape::Keyed(map) => {
                info!(collection, entities = map.len(), "normalizing keyed corpus");
                normalize_keyed(&map, collection, &self.options.profile)
            }
        };

        for (i, doc) in documents.iter_mut().enumerate() {
            doc.id = format!("{collection}:{i}");
        }
        documents
    }

    /// Load a source and normalize it.
    ///
    /// A missing source is not fatal here: it is logged and yields an empty
    /// corpus, leaving the caller to decide whether that is acceptable.
    ///
    /// # Errors
    /// Parse and format errors abort ingestion; no partial corpus is returned.
    pub fn ingest(&self, source: &dyn CorpusSource) -> Result<Vec<Document>> {
        let collection = source.collection_id();
        let shape = match source.load() {
            Ok(shape) => shape,
            Err(Error::CorpusNotFound(path)) => {
                warn!(collection, path = %path.display(), "corpus file not found, corpus is empty");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let documents = self.normalize(shape, &collection);
        info!(collection, documents = documents.len(), "corpus normalized");
        Ok(documents)
    }
}

/// Render a JSON value as it appears after `field: ` in document text.
///
/// Strings are raw, arrays are joined with `, `, objects are compact JSON.
/// Returns `None` for values that carry nothing (`null`, blank strings,
/// empty arrays and objects).
pub(crate) fn render_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(items) if items.is_empty() => None,
        Value::Array(items) => Some(
            items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(", "),
        ),
        Value::Object(map) if map.is_empty() => None,
        other => Some(other.to_string()),
    }
}

mod flat;
mod keyed;
mod parse;
mod source;

pub use flat::*;
pub use keyed::*;
pub use parse::*;
pub use source::*;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_collection_id_from_file_stem() {
        assert_eq!(collection_id_for(Path::new("/data/courses_en.json")), "courses_en");
        assert_eq!(
            collection_id_for(Path::new("All_Player_Stat_Season_wise_2016_to_2025.json")),
            "All_Player_Stat_Season_wise_2016_to_2025"
        );
        assert_eq!(collection_id_for(Path::new("/")), DEFAULT_COLLECTION);
    }

    #[test]
    fn test_different_files_different_collections() {
        assert_ne!(
            collection_id_for(Path::new("a/courses.json")),
            collection_id_for(Path::new("a/players.json"))
        );
    }

    #[test]
    fn test_shape_detection() {
        assert!(matches!(CorpusShape::from_value(json!([])), Ok(CorpusShape::Flat(_))));
        assert!(matches!(CorpusShape::from_value(json!({})), Ok(CorpusShape::Keyed(_))));
        assert!(matches!(
            CorpusShape::from_value(json!("just a string")),
            Err(Error::CorpusFormat(_))
        ));
        assert!(matches!(CorpusShape::from_value(json!(3)), Err(Error::CorpusFormat(_))));
    }

    #[test]
    fn test_metadata_truncates_long_strings() {
        let mut meta = Metadata::new();
        meta.insert("long", "é".repeat(MAX_METADATA_CHARS + 10));
        let value = meta.get("long").and_then(MetaValue::as_str).unwrap();
        assert_eq!(value.chars().count(), MAX_METADATA_CHARS + 1);
        assert!(value.ends_with('…'));
    }

    #[test]
    fn test_metadata_short_strings_untouched() {
        let mut meta = Metadata::new();
        meta.insert("name", "Rust 101");
        assert_eq!(meta.get("name"), Some(&MetaValue::Str("Rust 101".into())));
    }

    #[test]
    fn test_meta_value_from_json() {
        assert_eq!(MetaValue::from_json(&json!(null)), None);
        assert_eq!(MetaValue::from_json(&json!(7)), Some(MetaValue::Int(7)));
        assert_eq!(MetaValue::from_json(&json!(1.5)), Some(MetaValue::Float(1.5)));
        assert_eq!(
            MetaValue::from_json(&json!({"a": 1})),
            Some(MetaValue::Str(r#"{"a":1}"#.into()))
        );
    }

    #[test]
    fn test_metadata_serializes_flat() {
        let mut meta = Metadata::new();
        meta.insert("index", 3usize);
        meta.insert("source", "courses");
        let text = serde_json::to_string(&meta).unwrap();
        assert_eq!(text, r#"{"index":3,"source":"courses"}"#);
        let back: Metadata = serde_json::from_str(&text).unwrap();
        assert_eq!(back, meta);
    }

    #[test]
    fn test_render_value() {
        assert_eq!(render_value(&json!(null)), None);
        assert_eq!(render_value(&json!("  ")), None);
        assert_eq!(render_value(&json!([])), None);
        assert_eq!(render_value(&json!(["a", "b", 3])), Some("a, b, 3".into()));
        assert_eq!(render_value(&json!({"h": 2})), Some(r#"{"h":2}"#.into()));
        assert_eq!(render_value(&json!(false)), Some("false".into()));
    }

    #[test]
    fn test_normalize_assigns_ids() {
        let normalizer = Normalizer::default();
        let shape = CorpusShape::Flat(vec![json!({"name": "a"}), json!({"name": "b"})]);
        let docs = normalizer.normalize(shape, "courses");
        let ids: Vec<_> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["courses:0", "courses:1"]);
    }
}
