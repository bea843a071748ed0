//! Fan-out and single-provider coordination
//!
//! A [`Relay`] owns one [`ProviderAdapter`] per [`ProviderKind`] and a
//! [`ConversationStore`]. Every request follows the same discipline: the user
//! message is persisted before any provider is called, each provider sees only
//! its own history, and each reply (text or error) is persisted afterwards.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chorus_store::{ConversationStore, Message, Role, SessionSummary};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::RelayError;
use crate::providers::{ChatProvider, DEFAULT_CALL_TIMEOUT, ProviderAdapter};
use crate::types::{FanOutReply, ProviderKind, ProviderReply, SingleReply};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// What `continue_with` does for a session that has never been written
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingSessionPolicy {
    /// Start a fresh history for the named provider
    #[default]
    Create,
    /// Fail with `SessionNotFound`
    Reject,
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub system_prompt: String,
    pub call_timeout: Duration,
    pub max_concurrent_calls: usize,
    pub missing_session: MissingSessionPolicy,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            max_concurrent_calls: 6,
            missing_session: MissingSessionPolicy::Create,
        }
    }
}

/// The three concrete providers a relay is built from
pub struct ProviderSet {
    pub openai: Arc<dyn ChatProvider>,
    pub claude: Arc<dyn ChatProvider>,
    pub gemini: Arc<dyn ChatProvider>,
}

impl ProviderSet {
    fn into_pairs(self) -> [(ProviderKind, Arc<dyn ChatProvider>); 3] {
        [
            (ProviderKind::OpenAi, self.openai),
            (ProviderKind::Claude, self.claude),
            (ProviderKind::Gemini, self.gemini),
        ]
    }
}

/// Which backend and model serve a provider slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderInfo {
    pub provider: ProviderKind,
    pub backend: String,
    pub model: String,
}

pub struct Relay {
    store: Arc<dyn ConversationStore>,
    adapters: BTreeMap<ProviderKind, ProviderAdapter>,
    permits: Arc<Semaphore>,
    config: RelayConfig,
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("store", &self.store.backend())
            .field("adapters", &self.adapters)
            .field("config", &self.config)
            .finish()
    }
}

impl Relay {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        providers: ProviderSet,
        config: RelayConfig,
    ) -> Self {
        let adapters = providers
            .into_pairs()
            .into_iter()
            .map(|(kind, provider)| {
                (
                    kind,
                    ProviderAdapter::new(kind, provider).with_timeout(config.call_timeout),
                )
            })
            .collect();

        Self {
            store,
            adapters,
            permits: Arc::new(Semaphore::new(config.max_concurrent_calls.max(1))),
            config,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn store_backend(&self) -> &str {
        self.store.backend()
    }

    pub fn providers(&self) -> Vec<ProviderInfo> {
        self.adapters
            .values()
            .map(|a| ProviderInfo {
                provider: a.kind(),
                backend: a.provider_name().to_string(),
                model: a.model().to_string(),
            })
            .collect()
    }

    /// Send `message` to every provider with its own history and merge the replies.
    ///
    /// Provider failures never fail the call; only an empty message or a store
    /// error does.
    pub async fn chat(&self, session_id: &str, message: &str) -> Result<FanOutReply, RelayError> {
        if message.trim().is_empty() {
            return Err(RelayError::EmptyMessage);
        }

        let started = Instant::now();
        let user = Message::user(message);

        // Every user turn is durable before the first provider is called
        let mut histories = Vec::with_capacity(ProviderKind::ALL.len());
        for kind in ProviderKind::ALL {
            let mut history = self.store.get(session_id, kind.as_str()).await?;
            self.store.append(session_id, kind.as_str(), &user).await?;
            history.push(user.clone());
            histories.push((kind, history));
        }

        let handles: Vec<_> = histories
            .into_iter()
            .map(|(kind, history)| (kind, self.dispatch(kind, history)))
            .collect();

        let mut replies = FanOutReply::default();
        for (kind, handle) in handles {
            replies.insert(kind, Self::join(kind, handle).await);
        }

        for (kind, reply) in replies.iter() {
            self.store
                .append(session_id, kind.as_str(), &Message::assistant(reply.to_text()))
                .await?;
        }

        info!(
            "Fan-out for session '{}' finished in {:?} ({} of {} providers failed)",
            session_id,
            started.elapsed(),
            replies.error_count(),
            replies.len()
        );
        Ok(replies)
    }

    /// Continue the conversation with one provider; the other histories are untouched.
    pub async fn continue_with(
        &self,
        session_id: &str,
        provider: ProviderKind,
        message: &str,
    ) -> Result<SingleReply, RelayError> {
        if message.trim().is_empty() {
            return Err(RelayError::EmptyMessage);
        }

        if self.config.missing_session == MissingSessionPolicy::Reject
            && !self.store.session_exists(session_id).await?
        {
            return Err(RelayError::SessionNotFound(session_id.to_string()));
        }

        let user = Message::user(message);
        let mut history = self.store.get(session_id, provider.as_str()).await?;
        self.store.append(session_id, provider.as_str(), &user).await?;
        history.push(user);

        let handle = self.dispatch(provider, history);
        let reply = Self::join(provider, handle).await;

        self.store
            .append(session_id, provider.as_str(), &Message::assistant(reply.to_text()))
            .await?;

        debug!(
            "Continued session '{}' with {} (error={})",
            session_id,
            provider,
            reply.is_error()
        );
        Ok(SingleReply {
            response: reply,
            model: provider,
        })
    }

    /// Drop every provider's history for the session. Unknown sessions are fine.
    pub async fn reset(&self, session_id: &str) -> Result<(), RelayError> {
        self.store.clear(session_id).await?;
        info!("Reset session '{}'", session_id);
        Ok(())
    }

    pub async fn sessions(&self) -> Result<Vec<SessionSummary>, RelayError> {
        Ok(self.store.list_sessions().await?)
    }

    /// Stored history of every provider for one session
    pub async fn history(
        &self,
        session_id: &str,
    ) -> Result<BTreeMap<ProviderKind, Vec<Message>>, RelayError> {
        let mut histories = BTreeMap::new();
        for kind in ProviderKind::ALL {
            histories.insert(kind, self.store.get(session_id, kind.as_str()).await?);
        }
        Ok(histories)
    }

    /// Spawn one provider call holding a relay-wide permit.
    fn dispatch(&self, kind: ProviderKind, history: Vec<Message>) -> JoinHandle<ProviderReply> {
        let adapter = self.adapters[&kind].clone();
        let permits = Arc::clone(&self.permits);
        let outgoing = self.with_system_prompt(history);

        tokio::spawn(async move {
            // The semaphore is never closed, so acquisition only fails if it were.
            let _permit = permits.acquire_owned().await.ok();
            adapter.call(&outgoing).await
        })
    }

    async fn join(kind: ProviderKind, handle: JoinHandle<ProviderReply>) -> ProviderReply {
        match handle.await {
            Ok(reply) => reply,
            Err(e) => {
                error!("{} call task failed: {}", kind, e);
                ProviderReply::Error(format!("{} call panicked: {}", kind, e))
            }
        }
    }

    /// Exactly one system message, first, followed by the stored turns.
    fn with_system_prompt(&self, history: Vec<Message>) -> Vec<Message> {
        let mut outgoing = Vec::with_capacity(history.len() + 1);
        outgoing.push(Message::system(self.config.system_prompt.clone()));
        outgoing.extend(history.into_iter().filter(|m| m.role != Role::System));
        outgoing
    }
}
