use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde_json::{Map, Value};
use tracing::debug;

use crate::corpus::{render_value, Document, MetaValue, Metadata};
use crate::names::{name_tokens_text, normalize_key};

/// A source field and the label it is shown under.
#[derive(Debug, Clone, PartialEq)]
pub struct StatField {
    pub key: String,
    pub label: String,
}

impl StatField {
    pub fn new(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
        }
    }
}

/// A titled block of per-period scalar stats.
#[derive(Debug, Clone, PartialEq)]
pub struct StatSection {
    pub title: String,
    pub fields: Vec<StatField>,
}

/// Per-match arrays listed together.
///
/// The group is shown only if its first series is non-empty, or, with
/// `only_if_nonzero`, contains a non-zero entry.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesGroup {
    pub fields: Vec<StatField>,
    pub only_if_nonzero: bool,
}

/// `numerator / denominator * scale`, 0 when the denominator is 0.
#[derive(Debug, Clone, PartialEq)]
pub struct Rate {
    pub label: String,
    pub numerator: String,
    pub denominator: String,
    pub scale: f64,
}

impl Rate {
    fn eval(&self, totals: &BTreeMap<String, f64>) -> f64 {
        let num = totals.get(&self.numerator).copied().unwrap_or(0.0);
        let den = totals.get(&self.denominator).copied().unwrap_or(0.0);
        if den == 0.0 { 0.0 } else { num / den * self.scale }
    }
}

/// How season-keyed entities are rendered.
///
/// Empty `sections`, `series`, `series_totals` and `career_totals` fall back
/// to rendering every field the period carries, so the default profile works
/// for any `{entity: {period: {stat: value}}}` corpus.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyedProfile {
    pub entity_label: String,
    pub tokens_label: String,
    pub period_label: String,
    pub periods_played_label: String,
    pub summary_title: String,
    pub series_title: String,
    /// Period id used on the aggregate document
    pub aggregate_period: String,
    pub sections: Vec<StatSection>,
    pub series: Vec<SeriesGroup>,
    pub series_totals: Vec<StatField>,
    pub career_totals: Vec<StatField>,
    pub career_rates: Vec<Rate>,
}

impl Default for KeyedProfile {
    fn default() -> Self {
        Self {
            entity_label: "Name".into(),
            tokens_label: "Name Variants".into(),
            period_label: "Period".into(),
            periods_played_label: "Periods".into(),
            summary_title: "SUMMARY (All Periods)".into(),
            series_title: "SERIES".into(),
            aggregate_period: "all_periods".into(),
            sections: Vec::new(),
            series: Vec::new(),
            series_totals: Vec::new(),
            career_totals: Vec::new(),
            career_rates: Vec::new(),
        }
    }
}

impl KeyedProfile {
    /// Season-wise cricket player statistics (`{player: {season: stats}}`).
    #[must_use]
    pub fn cricket() -> Self {
        let f = StatField::new;
        Self {
            entity_label: "Player Name".into(),
            tokens_label: "Player Names".into(),
            period_label: "Season".into(),
            periods_played_label: "Seasons Played".into(),
            summary_title: "CAREER SUMMARY (All Seasons)".into(),
            series_title: "MATCH-BY-MATCH DETAILS".into(),
            aggregate_period: "all_seasons".into(),
            sections: vec![
                StatSection {
                    title: "BATTING STATISTICS".into(),
                    fields: vec![
                        f("Total_Bt_Runs", "Total Batting Runs"),
                        f("Total_Bt_Balls", "Total Batting Balls"),
                        f("Bt_Avg", "Batting Average"),
                        f("Bt_strike_rate", "Batting Strike Rate"),
                        f("Total_Matches", "Total Matches"),
                    ],
                },
                StatSection {
                    title: "BOWLING STATISTICS".into(),
                    fields: vec![
                        f("Total_Bw_Runs", "Total Bowling Runs"),
                        f("Total_Bw_Balls", "Total Bowling Balls"),
                        f("Bw_economy", "Bowling Economy"),
                        f("Bw_wicket_per_match", "Wickets Per Match"),
                    ],
                },
            ],
            series: vec![
                SeriesGroup {
                    fields: vec![
                        f("Bt_Runs", "Batting Runs (per match)"),
                        f("Bt_Balls", "Batting Balls (per match)"),
                        f("Bt_four", "Fours (per match)"),
                        f("Bt_six", "Sixes (per match)"),
                        f("Bt_Wickets", "Batting Wickets (per match)"),
                    ],
                    only_if_nonzero: false,
                },
                SeriesGroup {
                    fields: vec![
                        f("Bw_Runs", "Bowling Runs (per match)"),
                        f("Bw_Balls", "Bowling Balls (per match)"),
                        f("Bw_Wickets", "Bowling Wickets (per match)"),
                    ],
                    only_if_nonzero: true,
                },
            ],
            series_totals: vec![
                f("Bt_four", "Total Fours"),
                f("Bt_six", "Total Sixes"),
                f("Bt_Wickets", "Total Batting Wickets"),
                f("Bw_Wickets", "Total Bowling Wickets"),
            ],
            career_totals: vec![
                f("Total_Bt_Runs", "Total Career Batting Runs"),
                f("Total_Bt_Balls", "Total Career Batting Balls"),
                f("Total_Matches", "Total Career Matches"),
            ],
            career_rates: vec![
                Rate {
                    label: "Career Batting Average".into(),
                    numerator: "Total_Bt_Runs".into(),
                    denominator: "Total_Matches".into(),
                    scale: 1.0,
                },
                Rate {
                    label: "Career Batting Strike Rate".into(),
                    numerator: "Total_Bt_Runs".into(),
                    denominator: "Total_Bt_Balls".into(),
                    scale: 100.0,
                },
            ],
        }
    }

    /// Look up a built-in profile by name.
    #[must_use]
    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "generic" => Some(Self::default()),
            "cricket" => Some(Self::cricket()),
            _ => None,
        }
    }
}

/// Normalize an entity-keyed corpus.
///
/// - entity → `{period: {stats}}`: one document per period plus one
///   aggregate document for the entity
/// - entity → `{field: value}`: one record document
/// - entity → scalar: one key/value document
///
/// Entities with nothing in them (null, blank, empty mapping) are dropped.
pub fn normalize_keyed(map: &Map<String, Value>, collection: &str, profile: &KeyedProfile) -> Vec<Document> {
    let mut documents = Vec::new();

    for (entity, value) in map {
        match value {
            Value::Object(fields) if fields.is_empty() => {
                debug!(collection, %entity, "skipping empty entity");
            }
            Value::Object(fields) if is_period_map(fields) => {
                let periods: Vec<(&String, &Map<String, Value>)> = fields
                    .iter()
                    .filter_map(|(period, stats)| stats.as_object().map(|s| (period, s)))
                    .collect();
                for (period, stats) in &periods {
                    documents.push(period_document(entity, period, stats, collection, profile));
                }
                documents.push(aggregate_document(entity, &periods, collection, profile));
            }
            Value::Object(fields) => documents.push(record_document(entity, fields, collection)),
            other => match render_value(other) {
                Some(rendered) => {
                    let mut metadata = Metadata::new();
                    metadata.insert("source", collection);
                    metadata.insert("key", entity.as_str());
                    metadata.insert("value", rendered.clone());
                    documents.push(Document {
                        id: String::new(),
                        text: format!("Key: {entity}\nValue: {rendered}"),
                        metadata,
                    });
                }
                None => debug!(collection, %entity, "skipping blank entity"),
            },
        }
    }

    documents
}

/// A mapping is per-period when every non-null value in it is itself a mapping.
fn is_period_map(fields: &Map<String, Value>) -> bool {
    let mut values = fields.values().filter(|v| !v.is_null()).peekable();
    values.peek().is_some() && values.all(Value::is_object)
}

fn record_document(entity: &str, fields: &Map<String, Value>, collection: &str) -> Document {
    let mut lines = vec![format!("Key: {entity}")];
    let mut metadata = Metadata::new();

    for (key, value) in fields {
        let rendered = match value {
            Value::Array(a) if a.is_empty() => None,
            Value::Array(_) | Value::Object(_) => Some(value.to_string()),
            scalar => {
                let text = render_value(scalar);
                if let Some(t) = &text {
                    insert_field(&mut metadata, key, t.clone());
                }
                text
            }
        };
        if let Some(rendered) = rendered {
            lines.push(format!("{key}: {rendered}"));
        }
    }

    metadata.insert("source", collection);
    metadata.insert("key", entity);

    Document {
        id: String::new(),
        text: lines.join("\n"),
        metadata,
    }
}

fn period_document(
    entity: &str,
    period: &str,
    stats: &Map<String, Value>,
    collection: &str,
    profile: &KeyedProfile,
) -> Document {
    let tokens = name_tokens_text(entity);
    let mut text = String::new();
    let _ = writeln!(text, "{}: {entity}", profile.entity_label);
    let _ = writeln!(text, "{}: {tokens}", profile.tokens_label);
    let _ = writeln!(text, "{}: {period}", profile.period_label);

    // stats
    if profile.sections.is_empty() {
        let lines: Vec<String> = stats
            .iter()
            .filter(|(_, v)| !v.is_array())
            .filter_map(|(k, v)| render_value(v).map(|r| format!("- {k}: {r}")))
            .collect();
        push_block(&mut text, "STATISTICS", &lines);
    } else {
        for section in &profile.sections {
            let lines: Vec<String> = section
                .fields
                .iter()
                .map(|f| format!("- {}: {}", f.label, stat_text(stats.get(&f.key))))
                .collect();
            push_block(&mut text, &section.title, &lines);
        }
    }

    // per-match series
    let mut series_lines = Vec::new();
    if profile.series.is_empty() {
        for (key, value) in stats {
            if let Value::Array(items) = value {
                if !items.is_empty() {
                    series_lines.push(format!("- {key}: {}", render_list(items)));
                }
            }
        }
    } else {
        for group in &profile.series {
            let Some(first) = group.fields.first() else {
                continue;
            };
            let lead = series(stats, &first.key);
            let shown = if group.only_if_nonzero {
                lead.iter().any(|v| as_number(v).is_some_and(|x| x != 0.0))
            } else {
                !lead.is_empty()
            };
            if shown {
                for field in &group.fields {
                    series_lines.push(format!("- {}: {}", field.label, render_list(series(stats, &field.key))));
                }
            }
        }
    }
    push_block(&mut text, &profile.series_title, &series_lines);

    // summary sums
    let summary: Vec<String> = if profile.series_totals.is_empty() {
        stats
            .iter()
            .filter(|(_, v)| v.as_array().is_some_and(|a| a.iter().any(|x| as_number(x).is_some())))
            .map(|(k, v)| format!("- Total {k}: {}", fmt_number(sum_series(v))))
            .collect()
    } else {
        profile
            .series_totals
            .iter()
            .map(|f| {
                let total = stats.get(&f.key).map_or(0.0, sum_series);
                format!("- {}: {}", f.label, fmt_number(total))
            })
            .collect()
    };
    push_block(&mut text, "SUMMARY", &summary);

    let mut metadata = entity_metadata(entity, collection);
    metadata.insert("period", period);
    let promoted: Vec<&str> = if profile.sections.is_empty() {
        stats
            .iter()
            .filter(|(_, v)| v.is_number())
            .map(|(k, _)| k.as_str())
            .collect()
    } else {
        profile
            .sections
            .iter()
            .flat_map(|s| s.fields.iter().map(|f| f.key.as_str()))
            .collect()
    };
    for key in promoted {
        let value = stats.get(key).and_then(as_number).unwrap_or(0.0);
        insert_field(&mut metadata, &key.to_lowercase(), number_meta(value));
    }

    Document {
        id: String::new(),
        text: text.trim_end().to_string(),
        metadata,
    }
}

fn aggregate_document(
    entity: &str,
    periods: &[(&String, &Map<String, Value>)],
    collection: &str,
    profile: &KeyedProfile,
) -> Document {
    let mut period_ids: Vec<&str> = periods.iter().map(|(p, _)| p.as_str()).collect();
    period_ids.sort_unstable();
    let period_list = period_ids.join(", ");

    // sum every numeric scalar across periods, keeping first-seen order
    let mut order: Vec<&str> = Vec::new();
    let mut totals: BTreeMap<String, f64> = BTreeMap::new();
    for (_, stats) in periods {
        for (key, value) in *stats {
            if let Some(x) = value.as_f64() {
                if !totals.contains_key(key) {
                    order.push(key);
                }
                *totals.entry(key.clone()).or_default() += x;
            }
        }
    }

    let total_fields: Vec<StatField> = if profile.career_totals.is_empty() {
        order
            .iter()
            .map(|k| StatField::new(*k, format!("Total {k}")))
            .collect()
    } else {
        profile.career_totals.clone()
    };

    let mut lines = vec![format!("- {}: {period_list}", profile.periods_played_label)];
    let mut metadata = entity_metadata(entity, collection);
    for field in &total_fields {
        let total = totals.get(&field.key).copied().unwrap_or(0.0);
        lines.push(format!("- {}: {}", field.label, fmt_number(total)));
        insert_field(&mut metadata, &snake_case(&field.label), number_meta(total));
    }
    for rate in &profile.career_rates {
        lines.push(format!("- {}: {:.2}", rate.label, rate.eval(&totals)));
    }

    let mut text = String::new();
    let _ = writeln!(text, "{}: {entity}", profile.entity_label);
    let _ = writeln!(text, "{}: {}", profile.tokens_label, name_tokens_text(entity));
    push_block(&mut text, &profile.summary_title, &lines);

    metadata.insert("period", profile.aggregate_period.as_str());
    metadata.insert("total_periods", periods.len());
    metadata.insert("periods", period_list);

    Document {
        id: String::new(),
        text: text.trim_end().to_string(),
        metadata,
    }
}

/// Metadata keys the normalizer sets itself.
const RESERVED_KEYS: &[&str] = &[
    "source",
    "key",
    "entity_name",
    "entity_name_normalized",
    "entity_name_parts",
    "period",
    "total_periods",
    "periods",
];

/// Insert a record-derived field, moving reserved names to `stat_<name>`.
fn insert_field(metadata: &mut Metadata, key: &str, value: impl Into<MetaValue>) {
    if RESERVED_KEYS.contains(&key) {
        metadata.insert(format!("stat_{key}"), value);
    } else {
        metadata.insert(key, value);
    }
}

fn entity_metadata(entity: &str, collection: &str) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("source", collection);
    metadata.insert("key", entity);
    metadata.insert("entity_name", entity);
    metadata.insert("entity_name_normalized", normalize_key(entity));
    metadata.insert("entity_name_parts", name_tokens_text(entity));
    metadata
}

fn push_block(text: &mut String, title: &str, lines: &[String]) {
    if lines.is_empty() {
        return;
    }
    let _ = writeln!(text, "\n{title}:");
    for line in lines {
        let _ = writeln!(text, "{line}");
    }
}

fn series<'a>(stats: &'a Map<String, Value>, key: &str) -> &'a [Value] {
    stats.get(key).and_then(Value::as_array).map_or(&[], Vec::as_slice)
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn sum_series(value: &Value) -> f64 {
    value
        .as_array()
        .map_or(0.0, |items| items.iter().filter_map(as_number).sum())
}

fn stat_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "0".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn render_list(items: &[Value]) -> String {
    let parts: Vec<String> = items.iter().map(Value::to_string).collect();
    format!("[{}]", parts.join(", "))
}

/// Integral values print without a fractional part.
fn fmt_number(x: f64) -> String {
    if x.fract() == 0.0 && x.abs() < 1e15 {
        format!("{}", x as i64)
    } else {
        format!("{x}")
    }
}

fn number_meta(x: f64) -> MetaValue {
    if x.fract() == 0.0 && x.abs() < 1e15 {
        MetaValue::Int(x as i64)
    } else {
        MetaValue::Float(x)
    }
}

fn snake_case(label: &str) -> String {
    label
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("_")
}
