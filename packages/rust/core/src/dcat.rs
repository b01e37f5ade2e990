//! DCAT-AP 2.1.1 JSON-LD record builder.
//!
//! [`build`] is pure: the same stage outputs always produce the same
//! document. Human edits are overlaid later with
//! [`tiki_shared::merge_edits`]; the built document itself is never changed.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value, json};
use tiki_extraction::is_truthy;
use tiki_shared::{EnrichmentResult, ExtractionResult};

/// Namespace prefixes declared in every record's `@context`.
pub const DCAT_CONTEXT: [(&str, &str); 5] = [
    ("dcat", "http://www.w3.org/ns/dcat#"),
    ("dct", "http://purl.org/dc/terms/"),
    ("foaf", "http://xmlns.com/foaf/0.1/"),
    ("vcard", "http://www.w3.org/2006/vcard/ns#"),
    ("xsd", "http://www.w3.org/2001/XMLSchema#"),
];

/// Fields a user must supply when the pipeline cannot.
pub const REQUIRED_FIELDS: [&str; 3] = ["dct:license", "dct:publisher", "dcat:contactPoint"];

/// Output of [`build`].
#[derive(Debug, Clone, PartialEq)]
pub struct DcatBuild {
    pub jsonld: Value,
    /// Members of [`REQUIRED_FIELDS`] whose value on the dataset node is empty.
    pub empty_fields: Vec<String>,
}

fn typed_datetime(value: &DateTime<Utc>) -> Value {
    json!({
        "@value": value.to_rfc3339_opts(SecondsFormat::Secs, true),
        "@type": "xsd:dateTime",
    })
}

/// Assemble a DCAT-AP dataset record from the stage outputs.
pub fn build(
    extraction: &ExtractionResult,
    enrichment: Option<&EnrichmentResult>,
    filename: &str,
    file_size: u64,
) -> DcatBuild {
    let mut dataset = Map::new();
    dataset.insert("@type".into(), json!("dcat:Dataset"));

    let title = if extraction.title.is_empty() {
        filename
    } else {
        extraction.title.as_str()
    };
    dataset.insert("dct:title".into(), json!(title));
    dataset.insert(
        "dct:description".into(),
        json!(enrichment.map_or("", |e| e.generated_description.as_str())),
    );

    if let Some(enrichment) = enrichment {
        if !enrichment.suggested_themes.is_empty() {
            let themes: Vec<Value> = enrichment
                .suggested_themes
                .iter()
                .map(|theme| json!({"@id": theme}))
                .collect();
            dataset.insert("dcat:theme".into(), Value::Array(themes));
        }
        if !enrichment.suggested_keywords.is_empty() {
            dataset.insert(
                "dcat:keyword".into(),
                json!(enrichment.suggested_keywords),
            );
        }
    }

    if !extraction.language.is_empty() {
        dataset.insert("dct:language".into(), json!(extraction.language));
    }

    if !extraction.author.is_empty() {
        dataset.insert(
            "dct:creator".into(),
            json!({"@type": "foaf:Agent", "foaf:name": extraction.author}),
        );
    }

    if let Some(created) = &extraction.created_date {
        dataset.insert("dct:issued".into(), typed_datetime(created));
    }
    if let Some(modified) = &extraction.modified_date {
        dataset.insert("dct:modified".into(), typed_datetime(modified));
    }

    // Placeholders for the user to fill in
    for field in REQUIRED_FIELDS {
        dataset.insert(field.into(), json!(""));
    }

    dataset.insert(
        "dcat:distribution".into(),
        json!([{
            "@type": "dcat:Distribution",
            "dcat:mediaType": extraction.mime_type,
            "dcat:byteSize": file_size,
            "dct:title": filename,
        }]),
    );

    let empty_fields = REQUIRED_FIELDS
        .iter()
        .filter(|field| !dataset.get(**field).is_some_and(is_truthy))
        .map(|field| field.to_string())
        .collect();

    let context: Map<String, Value> = DCAT_CONTEXT
        .iter()
        .map(|(prefix, iri)| (prefix.to_string(), json!(iri)))
        .collect();

    DcatBuild {
        jsonld: json!({
            "@context": context,
            "@graph": [Value::Object(dataset)],
        }),
        empty_fields,
    }
}
