//! Anthropic Messages API backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tiki_shared::{EnrichmentConfig, Result, TikiError};
use tracing::{debug, instrument};
use url::Url;

use crate::backend::{Completion, CompletionBackend};

/// API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

const USER_AGENT: &str = concat!("Tiki/", env!("CARGO_PKG_VERSION"));

// --- Messages API request and response structures ---

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize, Debug)]
struct MessagesResponse {
    model: String,
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Deserialize, Debug)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

// --- Backend implementation ---

/// Calls `POST {api_url}/v1/messages`.
#[derive(Clone)]
pub struct AnthropicBackend {
    client: Client,
    endpoint: Url,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl std::fmt::Debug for AnthropicBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicBackend")
            .field("endpoint", &self.endpoint.as_str())
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .finish_non_exhaustive()
    }
}

impl AnthropicBackend {
    pub fn new(config: &EnrichmentConfig, api_key: impl Into<String>) -> Result<Self> {
        let mut base = Url::parse(&config.api_url).map_err(|e| {
            TikiError::config(format!("invalid enrichment API URL '{}': {e}", config.api_url))
        })?;
        if !base.path().ends_with('/') {
            let prefixed = format!("{}/", base.path());
            base.set_path(&prefixed);
        }
        let endpoint = base
            .join("v1/messages")
            .map_err(|e| TikiError::config(format!("invalid enrichment endpoint: {e}")))?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TikiError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            api_key: api_key.into(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl CompletionBackend for AnthropicBackend {
    #[instrument(skip_all, fields(model = %self.model))]
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<Completion> {
        let request_body = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system: system_prompt,
            messages: vec![Message {
                role: "user",
                content: user_prompt,
            }],
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| TikiError::Enrichment(format!("{}: {e}", self.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(TikiError::Enrichment(format!(
                "HTTP {status}: {}",
                error_text.chars().take(500).collect::<String>()
            )));
        }

        let body: MessagesResponse = response
            .json()
            .await
            .map_err(|e| TikiError::Enrichment(format!("unreadable messages response: {e}")))?;

        let text = body
            .content
            .into_iter()
            .find(|block| block.kind == "text")
            .and_then(|block| block.text)
            .ok_or_else(|| TikiError::Enrichment("response contained no text block".into()))?;

        debug!(
            input_tokens = body.usage.input_tokens,
            output_tokens = body.usage.output_tokens,
            "completion received"
        );

        Ok(Completion {
            text,
            model: body.model,
            input_tokens: body.usage.input_tokens,
            output_tokens: body.usage.output_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend_for(server: &MockServer) -> AnthropicBackend {
        let config = EnrichmentConfig {
            api_url: server.uri(),
            model: "claude-test".into(),
            timeout_secs: 5,
            ..EnrichmentConfig::default()
        };
        AnthropicBackend::new(&config, "sk-test").unwrap()
    }

    #[tokio::test]
    async fn sends_messages_request() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "sk-test"))
            .and(header("anthropic-version", "2023-06-01"))
            .and(body_partial_json(json!({
                "model": "claude-test",
                "max_tokens": 1024,
                "system": "be terse",
                "messages": [{"role": "user", "content": "hello"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "msg_1",
                "type": "message",
                "role": "assistant",
                "model": "claude-test-20250101",
                "content": [{"type": "text", "text": "{\"description\": \"hi\"}"}],
                "usage": {"input_tokens": 12, "output_tokens": 5}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let completion = backend_for(&server)
            .complete("be terse", "hello")
            .await
            .unwrap();
        assert_eq!(completion.text, "{\"description\": \"hi\"}");
        assert_eq!(completion.model, "claude-test-20250101");
        assert_eq!(completion.input_tokens, 12);
        assert_eq!(completion.output_tokens, 5);
    }

    #[tokio::test]
    async fn error_status_is_enrichment_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "type": "error",
                "error": {"type": "authentication_error", "message": "invalid x-api-key"}
            })))
            .mount(&server)
            .await;

        let err = backend_for(&server).complete("s", "u").await.unwrap_err();
        assert!(matches!(err, TikiError::Enrichment(_)));
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn response_without_text_block_fails() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "claude-test",
                "content": [],
                "usage": {"input_tokens": 1, "output_tokens": 0}
            })))
            .mount(&server)
            .await;

        let err = backend_for(&server).complete("s", "u").await.unwrap_err();
        assert!(matches!(err, TikiError::Enrichment(_)));
    }

    #[test]
    fn debug_hides_api_key() {
        let backend = AnthropicBackend::new(&EnrichmentConfig::default(), "sk-secret").unwrap();
        assert!(!format!("{backend:?}").contains("sk-secret"));
    }
}
