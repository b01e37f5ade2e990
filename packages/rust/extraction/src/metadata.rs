//! Normalisation of Tika metadata into canonical fields.
//!
//! Tika reports the same property under different keys depending on the
//! parser that handled the document. Each canonical field has a fixed,
//! priority-ordered key list and the first non-empty value wins.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use tiki_shared::ExtractionResult;
use tracing::warn;

pub const AUTHOR_KEYS: &[&str] = &[
    "Author",
    "dc:creator",
    "meta:author",
    "creator",
    "pdf:docinfo:author",
];
pub const TITLE_KEYS: &[&str] = &["title", "dc:title", "meta:title", "pdf:docinfo:title"];
pub const CREATED_DATE_KEYS: &[&str] = &[
    "created",
    "dcterms:created",
    "meta:creation-date",
    "Creation-Date",
];
pub const MODIFIED_DATE_KEYS: &[&str] = &[
    "modified",
    "dcterms:modified",
    "Last-Modified",
    "Last-Save-Date",
];
pub const LANGUAGE_KEYS: &[&str] = &["language", "dc:language", "Content-Language"];

/// Key holding the document's MIME type.
const CONTENT_TYPE_KEY: &str = "Content-Type";

/// Key under which `/rmeta/text` returns the extracted body.
pub(crate) const CONTENT_KEY: &str = "X-TIKA:content";

/// Whether a metadata value counts as present.
///
/// `null`, `""`, `[]`, `{}`, `false` and numeric zero are all empty.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Render a metadata value as text. Strings are returned as-is; anything
/// else becomes its JSON representation.
fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Return the first non-empty value among `keys`, or `""`.
pub fn first_match(metadata: &Map<String, Value>, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|key| metadata.get(*key))
        .find(|value| is_truthy(value))
        .map(render)
        .unwrap_or_default()
}

/// Best-effort date parsing against the formats Tika emits.
///
/// Values without an offset are taken as UTC. Empty input yields `None`
/// silently; anything unparsable yields `None` and a warning.
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    if value.is_empty() {
        return None;
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%SZ") {
        return Some(naive.and_utc());
    }
    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc());
    }
    if let Some(midnight) = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
    {
        return Some(midnight.and_utc());
    }

    warn!(value, "could not parse date");
    None
}

/// Build an [`ExtractionResult`] from one Tika metadata object and the
/// extracted text.
pub fn normalize(metadata: Map<String, Value>, content: &str) -> ExtractionResult {
    ExtractionResult {
        mime_type: metadata
            .get(CONTENT_TYPE_KEY)
            .filter(|v| !v.is_null())
            .map(render)
            .unwrap_or_default(),
        language: first_match(&metadata, LANGUAGE_KEYS),
        author: first_match(&metadata, AUTHOR_KEYS),
        title: first_match(&metadata, TITLE_KEYS),
        created_date: parse_date(&first_match(&metadata, CREATED_DATE_KEYS)),
        modified_date: parse_date(&first_match(&metadata, MODIFIED_DATE_KEYS)),
        full_text: content.trim().to_string(),
        raw_metadata: metadata,
    }
}
