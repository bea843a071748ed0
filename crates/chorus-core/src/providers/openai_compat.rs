//! OpenAI-compatible provider for OpenRouter and similar gateways
//!
//! Reuses the OpenAI wire format with a configurable base URL. This is how the
//! relay reaches Claude when it is routed through OpenRouter.

use anyhow::Result;
use async_trait::async_trait;
use chorus_store::Message;

use super::openai::OpenAiProvider;
use super::types::ChatProvider;

/// OpenAI-compatible provider: wraps [`OpenAiProvider`] with a custom name
pub struct OpenAiCompatProvider {
    inner: OpenAiProvider,
    name: String,
}

impl std::fmt::Debug for OpenAiCompatProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatProvider")
            .field("name", &self.name)
            .field("inner", &self.inner)
            .finish()
    }
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    ///
    /// - `name`: human-readable label (e.g. "openrouter")
    /// - `base_url`: the endpoint root without `/v1` (e.g. `https://openrouter.ai/api`)
    pub fn new(
        name: String,
        api_key: String,
        model: String,
        base_url: String,
        max_tokens: u32,
    ) -> Result<Self> {
        Ok(Self {
            inner: OpenAiProvider::new(api_key, model, base_url, max_tokens)?,
            name,
        })
    }
}

#[async_trait]
impl ChatProvider for OpenAiCompatProvider {
    fn provider_name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    async fn chat(&self, messages: &[Message]) -> Result<String> {
        self.inner.chat(messages).await
    }
}
