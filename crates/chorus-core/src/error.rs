use thiserror::Error;

/// Request-level failures. Provider failures never show up here; they are
/// folded into [`crate::ProviderReply::Error`] at the adapter boundary.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Unknown provider '{0}' (expected openai, claude or gemini)")]
    UnknownProvider(String),
    #[error("Session '{0}' not found")]
    SessionNotFound(String),
    #[error("Message must not be empty")]
    EmptyMessage,
    #[error("Conversation store failure: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl RelayError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownProvider(_) => "UNKNOWN_PROVIDER",
            Self::SessionNotFound(_) => "SESSION_NOT_FOUND",
            Self::EmptyMessage => "EMPTY_MESSAGE",
            Self::Store(_) => "STORE_ERROR",
        }
    }
}
