//! Prompt construction and response parsing.
//!
//! Everything here is backend-independent and pure, except for the error
//! log emitted when a response cannot be parsed.

use serde_json::{Map, Value};
use tracing::error;

/// Maximum number of characters of document text sent to the model.
pub const TEXT_TRUNCATE_LIMIT: usize = 4000;

/// System instruction sent with every enrichment request.
pub const SYSTEM_PROMPT: &str = "\
You are a metadata enrichment assistant. Given document metadata and text, \
produce a JSON object with these keys:
- \"themes\": a list of EU Data Theme URIs from \
http://publications.europa.eu/resource/authority/data-theme (e.g. \
\"http://publications.europa.eu/resource/authority/data-theme/GOVE\")
- \"description\": a concise description of the document suitable for a \
DCAT-AP dataset record (2-4 sentences)
- \"keywords\": a list of 3-8 relevant keywords as strings

Respond with ONLY valid JSON, no markdown fences or extra text.";

/// Document facts included in the user prompt.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentFacts<'a> {
    pub title: &'a str,
    pub author: &'a str,
    pub mime_type: &'a str,
    pub language: &'a str,
}

/// Suggestions read from a model response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedEnrichment {
    pub themes: Vec<String>,
    pub description: String,
    pub keywords: Vec<String>,
}

/// Keep the first [`TEXT_TRUNCATE_LIMIT`] characters of `text`.
pub fn truncate_text(text: &str) -> &str {
    match text.char_indices().nth(TEXT_TRUNCATE_LIMIT) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Build the user prompt. Metadata lines appear only when non-empty.
pub fn build_prompt(text: &str, facts: &DocumentFacts<'_>) -> String {
    let mut parts = vec!["Analyse this document and produce metadata enrichment.\n".to_string()];

    for (label, value) in [
        ("Title", facts.title),
        ("Author", facts.author),
        ("MIME type", facts.mime_type),
        ("Language", facts.language),
    ] {
        if !value.is_empty() {
            parts.push(format!("{label}: {value}"));
        }
    }

    parts.push(format!("\nDocument text:\n{text}"));
    parts.join("\n")
}

/// Strip an optional Markdown code fence from a response.
fn strip_fences(text: &str) -> String {
    let cleaned = text.trim();
    if !cleaned.starts_with("```") {
        return cleaned.to_string();
    }

    let mut lines: Vec<&str> = cleaned.split('\n').skip(1).collect();
    if lines.last().is_some_and(|last| last.trim() == "```") {
        lines.pop();
    }
    lines.join("\n")
}

/// Parse a model response into suggestions.
///
/// Malformed output never fails: it is logged and treated as an empty
/// object. Non-string entries in `themes` and `keywords` are dropped.
pub fn parse_response(text: &str) -> ParsedEnrichment {
    let object = match serde_json::from_str::<Value>(&strip_fences(text)) {
        Ok(Value::Object(map)) => map,
        Ok(_) | Err(_) => {
            error!(
                response = %text.chars().take(200).collect::<String>(),
                "failed to parse enrichment response as JSON object"
            );
            Map::new()
        }
    };

    ParsedEnrichment {
        themes: string_list(object.get("themes")),
        description: object
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        keywords: string_list(object.get("keywords")),
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
