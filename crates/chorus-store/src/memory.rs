//! In-process store; histories live as long as the process does

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::store::ConversationStore;
use crate::types::{Message, SessionSummary};

struct SessionRecord {
    created_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    histories: HashMap<String, Vec<Message>>,
}

/// Conversation store backed by a map behind an async `RwLock`
#[derive(Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, SessionRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    fn backend(&self) -> &str {
        "memory"
    }

    async fn get(&self, session_id: &str, provider: &str) -> Result<Vec<Message>> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(session_id)
            .and_then(|s| s.histories.get(provider))
            .cloned()
            .unwrap_or_default())
    }

    async fn append(&self, session_id: &str, provider: &str, message: &Message) -> Result<()> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let session = sessions.entry(session_id.to_string()).or_insert_with(|| {
            info!("Created session '{}'", session_id);
            SessionRecord {
                created_at: now,
                last_activity: now,
                histories: HashMap::new(),
            }
        });
        session.last_activity = now;
        let history = session.histories.entry(provider.to_string()).or_default();
        history.push(message.clone());
        debug!(
            "Session '{}' / {}: {} messages",
            session_id,
            provider,
            history.len()
        );
        Ok(())
    }

    async fn clear(&self, session_id: &str) -> Result<()> {
        let removed = self.sessions.write().await.remove(session_id);
        if removed.is_some() {
            info!("Cleared session '{}'", session_id);
        }
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        let sessions = self.sessions.read().await;
        let mut list: Vec<SessionSummary> = sessions
            .iter()
            .map(|(id, s)| SessionSummary {
                session_id: id.clone(),
                created_at: s.created_at,
                last_activity: s.last_activity,
            })
            .collect();
        list.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        Ok(list)
    }

    async fn session_exists(&self, session_id: &str) -> Result<bool> {
        Ok(self.sessions.read().await.contains_key(session_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    #[tokio::test]
    async fn test_get_missing_is_empty() {
        let store = MemoryStore::new();
        assert!(store.get("nope", "openai").await.unwrap().is_empty());
        assert!(!store.session_exists("nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_append_preserves_order_and_content() {
        let store = MemoryStore::new();
        store.append("s1", "claude", &Message::user("first")).await.unwrap();
        store
            .append("s1", "claude", &Message::assistant("second ✓\nline"))
            .await
            .unwrap();

        let history = store.get("s1", "claude").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0], Message::user("first"));
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(history[1].content, "second ✓\nline");
        assert!(store.get("s1", "openai").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_removes_session() {
        let store = MemoryStore::new();
        store.append("s1", "gemini", &Message::user("hi")).await.unwrap();
        store.clear("s1").await.unwrap();
        assert!(store.get("s1", "gemini").await.unwrap().is_empty());
        assert!(store.list_sessions().await.unwrap().is_empty());
        // Clearing again is fine
        store.clear("s1").await.unwrap();
    }

    #[tokio::test]
    async fn test_list_sorted_by_activity() {
        let store = MemoryStore::new();
        store.append("older", "openai", &Message::user("a")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        store.append("newer", "openai", &Message::user("b")).await.unwrap();

        let list = store.list_sessions().await.unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].session_id, "newer");

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        store.append("older", "claude", &Message::user("c")).await.unwrap();
        let list = store.list_sessions().await.unwrap();
        assert_eq!(list[0].session_id, "older");
        assert!(list[0].last_activity > list[0].created_at);
    }
}
