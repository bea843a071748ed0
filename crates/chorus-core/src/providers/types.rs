//! Provider-agnostic types for multi-vendor chat

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chorus_store::{Message, Role};
use reqwest::Client;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Trait that every vendor integration implements
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Human-readable provider name (e.g. "openai", "openrouter")
    fn provider_name(&self) -> &str;

    /// Model identifier (e.g. "gpt-4o-mini", "gemini-2.5-flash")
    fn model(&self) -> &str;

    /// Send an ordered conversation and return the assistant's text
    async fn chat(&self, messages: &[Message]) -> Result<String>;
}

/// Token usage from a single API call, for debug logging
#[derive(Debug, Clone, Copy, Default)]
pub struct ChatUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// HTTP client shared by the vendor integrations.
///
/// Only connecting is bounded here; the overall call deadline belongs to
/// [`super::ProviderAdapter`] so `call_timeout_secs` is the one knob.
pub(crate) fn http_client() -> Result<Client> {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .context("Failed to build HTTP client")
}

/// Join every system message into one instruction block.
///
/// Vendors that take the system prompt out of band (Anthropic, Gemini) use this.
pub(crate) fn system_prompt(messages: &[Message]) -> Option<String> {
    let parts: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_joins_system_messages() {
        let msgs = vec![
            Message::system("Be brief."),
            Message::user("hi"),
            Message::system("Be kind."),
        ];
        assert_eq!(system_prompt(&msgs).as_deref(), Some("Be brief.\n\nBe kind."));
    }

    #[test]
    fn test_system_prompt_absent() {
        assert!(system_prompt(&[Message::user("hi")]).is_none());
    }

    #[test]
    fn test_chat_usage_default() {
        let usage = ChatUsage::default();
        assert_eq!(usage.input_tokens, 0);
        assert_eq!(usage.output_tokens, 0);
    }
}
