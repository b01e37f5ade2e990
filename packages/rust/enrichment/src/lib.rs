//! Language-model enrichment of extracted documents.
//!
//! [`EnrichmentClient`] turns extracted text and metadata into suggested
//! themes, a description and keywords. The prompt logic lives in [`prompt`];
//! the wire call is delegated to a [`CompletionBackend`], with
//! [`AnthropicBackend`] as the production implementation.

mod anthropic;
mod backend;
pub mod prompt;

use std::sync::Arc;

use serde_json::json;
use tiki_shared::{EnrichmentConfig, EnrichmentResult, Result};
use tracing::{info, instrument};

pub use anthropic::AnthropicBackend;
pub use backend::{Completion, CompletionBackend};
pub use prompt::{DocumentFacts, ParsedEnrichment, SYSTEM_PROMPT, TEXT_TRUNCATE_LIMIT};

/// Enrichment client bound to one completion backend.
#[derive(Debug, Clone)]
pub struct EnrichmentClient {
    backend: Arc<dyn CompletionBackend>,
}

impl EnrichmentClient {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self { backend }
    }

    /// Build a client on the Anthropic backend, or `None` when no API key is
    /// configured.
    pub fn from_config(config: &EnrichmentConfig) -> Result<Option<Self>> {
        let Some(api_key) = config.api_key() else {
            info!(env = %config.api_key_env, "no API key configured, enrichment disabled");
            return Ok(None);
        };
        let backend = AnthropicBackend::new(config, api_key)?;
        Ok(Some(Self::new(Arc::new(backend))))
    }

    /// Ask the model for themes, a description and keywords.
    ///
    /// Transport failures and error statuses fail the call; a response that
    /// is not valid JSON yields empty suggestions.
    #[instrument(skip_all, fields(title = %facts.title, chars = text.chars().count()))]
    pub async fn enrich(&self, text: &str, facts: &DocumentFacts<'_>) -> Result<EnrichmentResult> {
        let user_prompt = prompt::build_prompt(prompt::truncate_text(text), facts);

        let completion = self.backend.complete(SYSTEM_PROMPT, &user_prompt).await?;

        let raw_response = json!({
            "content": completion.text,
            "model": completion.model,
            "usage": {
                "input_tokens": completion.input_tokens,
                "output_tokens": completion.output_tokens,
            },
        });

        let parsed = prompt::parse_response(&completion.text);
        info!(
            themes = parsed.themes.len(),
            keywords = parsed.keywords.len(),
            model = %completion.model,
            "enrichment complete"
        );

        Ok(EnrichmentResult {
            suggested_themes: parsed.themes,
            generated_description: parsed.description,
            suggested_keywords: parsed.keywords,
            prompt_used: user_prompt,
            raw_response,
            model_used: completion.model,
        })
    }
}
