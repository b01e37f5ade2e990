use async_trait::async_trait;
use std::fmt::Debug;
use tiki_shared::Result;

/// Text produced by a completion backend, with the accounting the service
/// reported for it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    /// Model identifier as echoed by the service.
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// A language-model service able to answer a single system + user prompt.
///
/// Failures to reach the service or non-success answers are reported as
/// [`tiki_shared::TikiError::Enrichment`].
#[async_trait]
pub trait CompletionBackend: Send + Sync + Debug {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<Completion>;
}
