//! The storage contract the relay is written against

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{Message, SessionSummary};

/// Conversation history keyed by (session, provider).
///
/// Messages for one key come back in the order they were appended. Sessions
/// spring into existence on their first append and disappear on `clear`.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Short backend name for status output (e.g. "sqlite", "memory")
    fn backend(&self) -> &str;

    /// Ordered history for one provider in one session; empty if absent
    async fn get(&self, session_id: &str, provider: &str) -> Result<Vec<Message>>;

    /// Append a message, creating the session if needed and bumping its last activity
    async fn append(&self, session_id: &str, provider: &str, message: &Message) -> Result<()>;

    /// Remove every message and the session record. Clearing an unknown session is a no-op.
    async fn clear(&self, session_id: &str) -> Result<()>;

    /// All sessions, most recently active first
    async fn list_sessions(&self) -> Result<Vec<SessionSummary>>;

    /// Whether any message has been stored for the session
    async fn session_exists(&self, session_id: &str) -> Result<bool>;
}
