//! chorus-core - Multi-provider chat relay
//!
//! This crate provides:
//! - OpenAI, Anthropic, OpenAI-compatible (OpenRouter) and Gemini chat clients
//! - A never-failing adapter that turns provider errors and timeouts into replies
//! - The relay that fans a message out to every provider with its own history
//! - Single-provider continuation, session reset and history queries

pub mod error;
pub mod providers;
pub mod relay;
pub mod types;

// Re-export main types for convenience
pub use error::RelayError;
pub use providers::{
    AnthropicProvider, ChatProvider, GoogleProvider, OpenAiCompatProvider, OpenAiProvider,
    ProviderAdapter,
};
pub use relay::{
    DEFAULT_SYSTEM_PROMPT, MissingSessionPolicy, ProviderInfo, ProviderSet, Relay, RelayConfig,
};
pub use types::{FanOutReply, ProviderKind, ProviderReply, SingleReply};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_relay_config() {
        let config = RelayConfig::default();
        assert_eq!(config.system_prompt, DEFAULT_SYSTEM_PROMPT);
        assert_eq!(config.call_timeout.as_secs(), 120);
        assert_eq!(config.max_concurrent_calls, 6);
        assert_eq!(config.missing_session, MissingSessionPolicy::Create);
    }

    #[test]
    fn test_missing_session_policy_parses_lowercase() {
        let policy: MissingSessionPolicy = serde_json::from_str("\"reject\"").unwrap();
        assert_eq!(policy, MissingSessionPolicy::Reject);
    }
}
