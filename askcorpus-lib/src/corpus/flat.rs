use serde_json::Value;
use tracing::debug;

use crate::corpus::{render_value, Document, Metadata, NormalizeOptions};

/// Normalize an array-of-records corpus: one document per non-empty object.
///
/// Text is `field: value` lines, priority fields first (in the configured
/// order), then every other non-empty field in record order. Non-object
/// elements and records with nothing to say are skipped.
pub fn normalize_flat(items: &[Value], collection: &str, options: &NormalizeOptions) -> Vec<Document> {
    let mut documents = Vec::with_capacity(items.len());

    for (index, item) in items.iter().enumerate() {
        let Value::Object(record) = item else {
            debug!(collection, index, "skipping non-object record");
            continue;
        };

        let mut lines = Vec::with_capacity(record.len());
        for key in &options.priority_fields {
            if let Some(rendered) = record.get(key).and_then(render_value) {
                lines.push(format!("{key}: {rendered}"));
            }
        }
        for (key, value) in record {
            if options.priority_fields.iter().any(|p| p == key) {
                continue;
            }
            if let Some(rendered) = render_value(value) {
                lines.push(format!("{key}: {rendered}"));
            }
        }

        if lines.is_empty() {
            debug!(collection, index, "skipping empty record");
            continue;
        }

        let mut metadata = Metadata::new();
        metadata.insert("source", collection);
        metadata.insert("index", index);
        for key in &options.promoted_fields {
            if let Some(value) = record.get(key) {
                metadata.insert_json(key.as_str(), value);
            }
        }

        documents.push(Document {
            id: String::new(),
            text: lines.join("\n"),
            metadata,
        });
    }

    documents
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::MetaValue;
    use serde_json::json;

    fn opts() -> NormalizeOptions {
        NormalizeOptions::default()
    }

    #[test]
    fn test_priority_fields_first() {
        let items = vec![json!({
            "url": "https://example.com/rust",
            "level": "beginner",
            "category": "Programming",
            "name": "Intro to Rust",
        })];
        let docs = normalize_flat(&items, "courses", &opts());

        assert_eq!(docs.len(), 1);
        assert_eq!(
            docs[0].text,
            "name: Intro to Rust\ncategory: Programming\nurl: https://example.com/rust\nlevel: beginner"
        );
    }

    #[test]
    fn test_arrays_and_nested_values() {
        let items = vec![json!({
            "name": "Data Science",
            "instructors": ["Ada", "Grace"],
            "schedule": {"weeks": 6},
            "tags": [],
            "notes": null,
            "summary": "",
        })];
        let docs = normalize_flat(&items, "courses", &opts());

        let text = &docs[0].text;
        assert!(text.contains("instructors: Ada, Grace"));
        assert!(text.contains(r#"schedule: {"weeks":6}"#));
        assert!(!text.contains("tags"));
        assert!(!text.contains("notes"));
        assert!(!text.contains("summary"));
    }

    #[test]
    fn test_one_document_per_object() {
        let items = vec![
            json!({"name": "a"}),
            json!("not a record"),
            json!(42),
            json!({"name": "b"}),
            json!(null),
        ];
        let docs = normalize_flat(&items, "courses", &opts());
        assert_eq!(docs.len(), 2);
    }

    #[test]
    fn test_empty_records_dropped() {
        let items = vec![json!({}), json!({"name": "", "skills": []}), json!({"name": "x"})];
        let docs = normalize_flat(&items, "courses", &opts());
        assert_eq!(docs.len(), 1);
        assert!(docs.iter().all(|d| !d.text.is_empty()));
    }

    #[test]
    fn test_metadata_index_is_array_position() {
        let items = vec![json!(1), json!({"name": "second"})];
        let docs = normalize_flat(&items, "courses", &opts());
        assert_eq!(docs[0].metadata.get("index"), Some(&MetaValue::Int(1)));
        assert_eq!(docs[0].metadata.get("source"), Some(&MetaValue::Str("courses".into())));
    }

    #[test]
    fn test_promoted_fields() {
        let items = vec![json!({
            "name": "ML",
            "category": "AI",
            "url": "u",
            "price": 10,
            "content": "long description",
        })];
        let docs = normalize_flat(&items, "courses", &opts());
        let meta = &docs[0].metadata;

        assert_eq!(meta.get("name"), Some(&MetaValue::Str("ML".into())));
        assert_eq!(meta.get("category"), Some(&MetaValue::Str("AI".into())));
        assert_eq!(meta.get("url"), Some(&MetaValue::Str("u".into())));
        assert!(meta.get("price").is_none());
        assert!(meta.get("content").is_none());
    }

    #[test]
    fn test_custom_priority_fields() {
        let options = NormalizeOptions {
            priority_fields: vec!["title".into()],
            ..NormalizeOptions::default()
        };
        let items = vec![json!({"year": 2020, "title": "Dune"})];
        let docs = normalize_flat(&items, "books", &options);
        assert_eq!(docs[0].text, "title: Dune\nyear: 2020");
    }
}
