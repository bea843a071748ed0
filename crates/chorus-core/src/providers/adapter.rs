//! Uniform, never-failing call surface over a [`ChatProvider`]

use std::sync::Arc;
use std::time::Duration;

use chorus_store::Message;
use tracing::{debug, warn};

use super::types::ChatProvider;
use crate::types::{ProviderKind, ProviderReply};

/// Default upper bound on a single provider call
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(120);

/// One provider slot in the relay.
///
/// `call` makes exactly one attempt and folds every failure (transport, HTTP
/// status, malformed body, timeout) into [`ProviderReply::Error`].
#[derive(Clone)]
pub struct ProviderAdapter {
    kind: ProviderKind,
    provider: Arc<dyn ChatProvider>,
    timeout: Duration,
}

impl std::fmt::Debug for ProviderAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderAdapter")
            .field("kind", &self.kind)
            .field("provider", &self.provider.provider_name())
            .field("model", &self.provider.model())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ProviderAdapter {
    pub fn new(kind: ProviderKind, provider: Arc<dyn ChatProvider>) -> Self {
        Self {
            kind,
            provider,
            timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    pub fn provider_name(&self) -> &str {
        self.provider.provider_name()
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }

    pub async fn call(&self, history: &[Message]) -> ProviderReply {
        debug!(
            "Calling {} via {} ({}) with {} messages",
            self.kind,
            self.provider.provider_name(),
            self.provider.model(),
            history.len()
        );

        match tokio::time::timeout(self.timeout, self.provider.chat(history)).await {
            Ok(Ok(text)) => ProviderReply::Text(text),
            Ok(Err(e)) => {
                warn!("{} ({}) failed: {:#}", self.kind, self.provider.model(), e);
                ProviderReply::Error(format!("{:#}", e))
            }
            Err(_) => {
                warn!(
                    "{} ({}) timed out after {:?}",
                    self.kind,
                    self.provider.model(),
                    self.timeout
                );
                ProviderReply::Error(format!(
                    "{} timed out after {}s",
                    self.kind,
                    self.timeout.as_secs_f64()
                ))
            }
        }
    }
}
