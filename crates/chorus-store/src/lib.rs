//! Conversation storage for chorus
//!
//! This crate provides:
//! - Role-tagged messages and session summaries
//! - The [`ConversationStore`] contract keyed by (session, provider)
//! - A SQLite backend for durable history
//! - An in-process backend for throwaway deployments and tests

pub mod memory;
pub mod sqlite;
pub mod store;
pub mod types;

// Re-export main types
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use store::ConversationStore;
pub use types::{Message, Role, SessionSummary};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_backends_share_the_contract() -> anyhow::Result<()> {
        let stores: Vec<Arc<dyn ConversationStore>> =
            vec![Arc::new(MemoryStore::new()), Arc::new(SqliteStore::in_memory()?)];

        for store in stores {
            store.append("s1", "openai", &Message::user("hi")).await?;
            store.append("s1", "openai", &Message::assistant("hello")).await?;
            assert_eq!(store.get("s1", "openai").await?.len(), 2);
            assert!(store.session_exists("s1").await?);

            store.clear("s1").await?;
            assert!(!store.session_exists("s1").await?);
            assert!(store.list_sessions().await?.is_empty(), "{}", store.backend());
        }
        Ok(())
    }
}
