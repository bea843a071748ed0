//! SQLite conversation store

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info, warn};

use crate::store::ConversationStore;
use crate::types::{Message, SessionSummary};

/// SQLite database wrapper (thread-safe via Arc<Mutex>)
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply the schema
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory {}", parent.display())
                })?;
            }
        }

        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        info!("Initializing conversation database at {:?}", path);
        Self::init(conn)
    }

    /// Database that lives only as long as this store
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory SQLite")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute("PRAGMA foreign_keys = ON", [])?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS sessions (
                session_id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                last_activity TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS messages (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                provider TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY(session_id) REFERENCES sessions(session_id) ON DELETE CASCADE
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_messages_session_provider
             ON messages(session_id, provider, seq)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_sessions_activity ON sessions(last_activity)",
            [],
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(conn: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
        conn.lock().unwrap_or_else(|poisoned| {
            warn!("Database mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn row_to_summary(row: &rusqlite::Row) -> rusqlite::Result<SessionSummary> {
        Ok(SessionSummary {
            session_id: row.get(0)?,
            created_at: parse_timestamp(row, 1)?,
            last_activity: parse_timestamp(row, 2)?,
        })
    }
}

/// Fixed-width RFC 3339 so that lexical order in SQL matches time order
fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

#[async_trait]
impl ConversationStore for SqliteStore {
    fn backend(&self) -> &str {
        "sqlite"
    }

    async fn get(&self, session_id: &str, provider: &str) -> Result<Vec<Message>> {
        let conn = Arc::clone(&self.conn);
        let session_id = session_id.to_owned();
        let provider = provider.to_owned();

        tokio::task::spawn_blocking(move || -> Result<Vec<Message>> {
            let conn = Self::lock(&conn);
            let mut stmt = conn.prepare(
                "SELECT role, content FROM messages
                 WHERE session_id = ?1 AND provider = ?2
                 ORDER BY seq ASC",
            )?;

            let rows = stmt
                .query_map(params![&session_id, &provider], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|(role, content)| {
                    Ok(Message {
                        role: role.parse()?,
                        content,
                    })
                })
                .collect()
        })
        .await
        .context("spawn_blocking task panicked")?
    }

    async fn append(&self, session_id: &str, provider: &str, message: &Message) -> Result<()> {
        let conn = Arc::clone(&self.conn);
        let session_id = session_id.to_owned();
        let provider = provider.to_owned();
        let message = message.clone();

        tokio::task::spawn_blocking(move || -> Result<()> {
            let now = format_timestamp(Utc::now());
            let mut conn = Self::lock(&conn);
            let tx = conn.transaction()?;

            tx.execute(
                "INSERT INTO sessions (session_id, created_at, last_activity)
                 VALUES (?1, ?2, ?2)
                 ON CONFLICT(session_id) DO UPDATE SET last_activity = excluded.last_activity",
                params![&session_id, &now],
            )?;
            tx.execute(
                "INSERT INTO messages (session_id, provider, role, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    &session_id,
                    &provider,
                    message.role.as_str(),
                    &message.content,
                    &now,
                ],
            )?;
            tx.commit()?;

            debug!(
                "Stored {} message for session '{}' / {}",
                message.role, session_id, provider
            );
            Ok(())
        })
        .await
        .context("spawn_blocking task panicked")?
    }

    async fn clear(&self, session_id: &str) -> Result<()> {
        let conn = Arc::clone(&self.conn);
        let session_id = session_id.to_owned();

        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut conn = Self::lock(&conn);
            let tx = conn.transaction()?;
            let messages = tx.execute(
                "DELETE FROM messages WHERE session_id = ?1",
                params![&session_id],
            )?;
            let sessions = tx.execute(
                "DELETE FROM sessions WHERE session_id = ?1",
                params![&session_id],
            )?;
            tx.commit()?;

            if sessions > 0 {
                info!(
                    "Cleared session '{}' ({} messages)",
                    session_id, messages
                );
            }
            Ok(())
        })
        .await
        .context("spawn_blocking task panicked")?
    }

    async fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        let conn = Arc::clone(&self.conn);

        tokio::task::spawn_blocking(move || -> Result<Vec<SessionSummary>> {
            let conn = Self::lock(&conn);
            let mut stmt = conn.prepare(
                "SELECT session_id, created_at, last_activity
                 FROM sessions
                 ORDER BY last_activity DESC",
            )?;
            let sessions = stmt
                .query_map([], Self::row_to_summary)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(sessions)
        })
        .await
        .context("spawn_blocking task panicked")?
    }

    async fn session_exists(&self, session_id: &str) -> Result<bool> {
        let conn = Arc::clone(&self.conn);
        let session_id = session_id.to_owned();

        tokio::task::spawn_blocking(move || -> Result<bool> {
            let conn = Self::lock(&conn);
            let found = conn
                .query_row(
                    "SELECT 1 FROM sessions WHERE session_id = ?1",
                    params![&session_id],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
        .await
        .context("spawn_blocking task panicked")?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    fn temp_store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("chorus.db")).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_round_trip_preserves_role_and_bytes() -> Result<()> {
        let (_dir, store) = temp_store();
        let content = "multi\nline — with 'quotes' and émojis 🎉";
        store.append("s1", "openai", &Message::user(content)).await?;
        store.append("s1", "openai", &Message::assistant("ok")).await?;

        let history = store.get("s1", "openai").await?;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].content.as_bytes(), content.as_bytes());
        assert_eq!(history[1], Message::assistant("ok"));
        Ok(())
    }

    #[tokio::test]
    async fn test_histories_are_partitioned() -> Result<()> {
        let (_dir, store) = temp_store();
        store.append("s1", "openai", &Message::user("a")).await?;
        store.append("s1", "claude", &Message::user("b")).await?;
        store.append("s2", "openai", &Message::user("c")).await?;

        assert_eq!(store.get("s1", "openai").await?, vec![Message::user("a")]);
        assert_eq!(store.get("s1", "claude").await?, vec![Message::user("b")]);
        assert_eq!(store.get("s2", "openai").await?, vec![Message::user("c")]);
        assert!(store.get("s2", "gemini").await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_clear_is_complete_and_idempotent() -> Result<()> {
        let (_dir, store) = temp_store();
        store.append("s1", "openai", &Message::user("a")).await?;
        store.append("s1", "gemini", &Message::user("b")).await?;
        store.append("keep", "gemini", &Message::user("c")).await?;

        store.clear("s1").await?;
        assert!(!store.session_exists("s1").await?);
        assert!(store.get("s1", "openai").await?.is_empty());
        assert!(store.get("s1", "gemini").await?.is_empty());

        let sessions = store.list_sessions().await?;
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].session_id, "keep");

        store.clear("s1").await?;
        store.clear("never-existed").await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_list_sessions_most_recent_first() -> Result<()> {
        let (_dir, store) = temp_store();
        store.append("older", "openai", &Message::user("a")).await?;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        store.append("newer", "openai", &Message::user("b")).await?;

        let sessions = store.list_sessions().await?;
        assert_eq!(sessions[0].session_id, "newer");
        assert_eq!(sessions[1].session_id, "older");

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        store.append("older", "claude", &Message::assistant("c")).await?;
        let sessions = store.list_sessions().await?;
        assert_eq!(sessions[0].session_id, "older");
        assert!(sessions[0].last_activity > sessions[0].created_at);
        Ok(())
    }

    #[tokio::test]
    async fn test_reopen_keeps_history() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested").join("chorus.db");
        {
            let store = SqliteStore::new(&path)?;
            store.append("s1", "claude", &Message::user("persisted")).await?;
        }
        let store = SqliteStore::new(&path)?;
        assert_eq!(store.get("s1", "claude").await?, vec![Message::user("persisted")]);
        assert!(store.session_exists("s1").await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_in_memory_database() -> Result<()> {
        let store = SqliteStore::in_memory()?;
        assert_eq!(store.backend(), "sqlite");
        store.append("s", "openai", &Message::user("x")).await?;
        assert!(store.session_exists("s").await?);
        Ok(())
    }
}
