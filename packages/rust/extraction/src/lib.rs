//! Apache Tika client for text and metadata extraction.
//!
//! Documents are sent to Tika's recursive metadata endpoint
//! (`PUT /rmeta/text`), which answers with a JSON array of metadata objects.
//! The first object describes the document itself and carries the extracted
//! text under `X-TIKA:content`; later objects describe embedded resources and
//! are ignored.

mod metadata;

use std::path::Path;
use std::time::Duration;

use reqwest::Client;
use serde_json::{Map, Value};
use tiki_shared::{ExtractionConfig, ExtractionResult, Result, TikiError};
use tracing::{debug, info, instrument};
use url::Url;

pub use metadata::{
    AUTHOR_KEYS, CREATED_DATE_KEYS, LANGUAGE_KEYS, MODIFIED_DATE_KEYS, TITLE_KEYS, first_match,
    is_truthy, normalize, parse_date,
};

/// User-Agent string for extraction requests.
const USER_AGENT: &str = concat!("Tiki/", env!("CARGO_PKG_VERSION"));

/// Client for a Tika server.
#[derive(Debug, Clone)]
pub struct TikaClient {
    client: Client,
    endpoint: Url,
}

impl TikaClient {
    /// Build a client from the `[extraction]` config section.
    pub fn new(config: &ExtractionConfig) -> Result<Self> {
        let mut base = Url::parse(&config.server_url).map_err(|e| {
            TikiError::config(format!(
                "invalid extraction server URL '{}': {e}",
                config.server_url
            ))
        })?;
        // Keep any path prefix when joining.
        if !base.path().ends_with('/') {
            let prefixed = format!("{}/", base.path());
            base.set_path(&prefixed);
        }
        let endpoint = base
            .join("rmeta/text")
            .map_err(|e| TikiError::config(format!("invalid extraction endpoint: {e}")))?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TikiError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, endpoint })
    }

    /// Extract text and normalised metadata from the file at `path`.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub async fn extract(&self, path: &Path) -> Result<ExtractionResult> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| TikiError::io(path, e))?;

        info!(bytes = bytes.len(), endpoint = %self.endpoint, "sending document to Tika");

        let response = self
            .client
            .put(self.endpoint.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .body(bytes)
            .send()
            .await
            .map_err(|e| TikiError::Extraction(format!("{}: {e}", self.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TikiError::Extraction(format!(
                "{}: HTTP {status}",
                self.endpoint
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| TikiError::Extraction(format!("failed to read response body: {e}")))?;

        let (metadata, content) = split_rmeta(&body)?;
        debug!(keys = metadata.len(), chars = content.len(), "Tika response parsed");

        Ok(normalize(metadata, &content))
    }
}

/// Split an `/rmeta/text` payload into the document's metadata and its text.
///
/// The content key is removed from the metadata so the stored raw metadata
/// does not duplicate the full text.
fn split_rmeta(body: &str) -> Result<(Map<String, Value>, String)> {
    let parsed: Value = serde_json::from_str(body).map_err(|e| {
        TikiError::Extraction(format!(
            "unparsable Tika response: {e} (got: {})",
            body.chars().take(200).collect::<String>()
        ))
    })?;

    let first = match parsed {
        Value::Array(items) => items.into_iter().next(),
        other => {
            return Err(TikiError::Extraction(format!(
                "expected a JSON array from Tika, got {}",
                json_kind(&other)
            )));
        }
    };

    let mut metadata = match first {
        Some(Value::Object(map)) => map,
        Some(other) => {
            return Err(TikiError::Extraction(format!(
                "expected a metadata object from Tika, got {}",
                json_kind(&other)
            )));
        }
        None => Map::new(),
    };

    let content = match metadata.remove(metadata::CONTENT_KEY) {
        Some(Value::String(text)) => text,
        _ => String::new(),
    };

    Ok((metadata, content))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_file(content: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("tiki_extract_{}.txt", uuid::Uuid::now_v7()));
        std::fs::write(&path, content).expect("write sample file");
        path
    }

    fn client_for(server: &MockServer) -> TikaClient {
        TikaClient::new(&ExtractionConfig {
            server_url: server.uri(),
            timeout_secs: 5,
        })
        .expect("build client")
    }

    #[test]
    fn split_rmeta_takes_first_object() {
        let body = json!([
            {"Content-Type": "application/pdf", "X-TIKA:content": "\n Hello \n"},
            {"Content-Type": "image/png", "X-TIKA:content": "embedded"}
        ])
        .to_string();
        let (meta, content) = split_rmeta(&body).unwrap();
        assert_eq!(meta.get("Content-Type").unwrap(), "application/pdf");
        assert!(!meta.contains_key("X-TIKA:content"));
        assert_eq!(content, "\n Hello \n");
    }

    #[test]
    fn split_rmeta_empty_array() {
        let (meta, content) = split_rmeta("[]").unwrap();
        assert!(meta.is_empty());
        assert!(content.is_empty());
    }

    #[test]
    fn split_rmeta_rejects_garbage() {
        assert!(matches!(
            split_rmeta("<html>oops</html>"),
            Err(TikiError::Extraction(_))
        ));
        assert!(matches!(
            split_rmeta(r#"{"not": "an array"}"#),
            Err(TikiError::Extraction(_))
        ));
    }

    #[test]
    fn invalid_server_url_is_config_error() {
        let err = TikaClient::new(&ExtractionConfig {
            server_url: "not a url".into(),
            timeout_secs: 5,
        })
        .unwrap_err();
        assert!(matches!(err, TikiError::Config { .. }));
    }

    #[tokio::test]
    async fn extract_against_mock_server() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/rmeta/text"))
            .and(header("accept", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "Content-Type": "text/plain; charset=UTF-8",
                "dc:creator": "Jane Doe",
                "dc:title": "Test Document",
                "dcterms:created": "2024-01-15T10:30:00Z",
                "language": "en",
                "X-TIKA:content": "\n\nHello world.\n"
            }])))
            .expect(1)
            .mount(&server)
            .await;

        let file = sample_file("Hello world.");
        let result = client_for(&server).extract(&file).await.unwrap();

        assert_eq!(result.mime_type, "text/plain; charset=UTF-8");
        assert_eq!(result.author, "Jane Doe");
        assert_eq!(result.title, "Test Document");
        assert_eq!(result.language, "en");
        assert_eq!(result.full_text, "Hello world.");
        assert!(result.created_date.is_some());
        assert!(result.modified_date.is_none());
        assert_eq!(result.raw_metadata.get("dc:creator").unwrap(), "Jane Doe");
    }

    #[tokio::test]
    async fn extract_server_error_is_extraction_error() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/rmeta/text"))
            .respond_with(ResponseTemplate::new(422))
            .mount(&server)
            .await;

        let file = sample_file("bytes");
        let err = client_for(&server).extract(&file).await.unwrap_err();
        assert!(matches!(err, TikiError::Extraction(_)));
        assert!(err.to_string().contains("422"));
    }

    #[tokio::test]
    async fn extract_unreachable_server() {
        // Nothing listens on port 9 locally.
        let client = TikaClient::new(&ExtractionConfig {
            server_url: "http://127.0.0.1:9".into(),
            timeout_secs: 2,
        })
        .unwrap();

        let file = sample_file("bytes");
        let err = client.extract(&file).await.unwrap_err();
        assert!(matches!(err, TikiError::Extraction(_)));
    }

    #[tokio::test]
    async fn extract_missing_file_is_io_error() {
        let server = MockServer::start().await;
        let err = client_for(&server)
            .extract(Path::new("/nonexistent/tiki/file.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, TikiError::Io { .. }));
    }
}
