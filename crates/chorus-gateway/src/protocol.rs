//! JSON bodies exchanged over the HTTP surface

use std::collections::BTreeMap;

use chorus_core::{ProviderInfo, ProviderKind};
use chorus_store::{Message, SessionSummary};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Session used when a request leaves `session_id` out
pub const DEFAULT_SESSION_ID: &str = "default";

/// `POST /chat`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// `POST /continue`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContinueRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// `POST /reset`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResetRequest {
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetResponse {
    pub status: String,
}

impl ResetResponse {
    pub fn success() -> Self {
        Self {
            status: "success".to_string(),
        }
    }
}

/// `GET /history`
#[derive(Debug, Clone, Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionSummary>,
}

/// `GET /history/{session_id}`
#[derive(Debug, Clone, Serialize)]
pub struct SessionHistoryResponse {
    pub session_id: String,
    pub histories: BTreeMap<ProviderKind, Vec<Message>>,
}

/// `GET /api/status`
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub started_at: DateTime<Utc>,
    pub store: String,
    pub providers: Vec<ProviderInfo>,
}

/// Blank or missing ids fall back to [`DEFAULT_SESSION_ID`]
pub fn resolve_session_id(session_id: Option<&str>) -> &str {
    match session_id.map(str::trim) {
        Some(id) if !id.is_empty() => id,
        _ => DEFAULT_SESSION_ID,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_optional_session() {
        let req: ChatRequest = serde_json::from_str(r#"{"message":"hello"}"#).unwrap();
        assert_eq!(req.message, "hello");
        assert!(req.session_id.is_none());

        let req: ChatRequest =
            serde_json::from_str(r#"{"message":"hi","session_id":"abc"}"#).unwrap();
        assert_eq!(req.session_id.as_deref(), Some("abc"));
    }

    #[test]
    fn test_missing_message_is_empty() {
        let req: ContinueRequest = serde_json::from_str(r#"{"model":"claude"}"#).unwrap();
        assert!(req.message.is_empty());
        assert_eq!(req.model, "claude");
    }

    #[test]
    fn test_resolve_session_id() {
        assert_eq!(resolve_session_id(None), "default");
        assert_eq!(resolve_session_id(Some("  ")), "default");
        assert_eq!(resolve_session_id(Some(" s1 ")), "s1");
    }

    #[test]
    fn test_reset_response_shape() {
        let json = serde_json::to_string(&ResetResponse::success()).unwrap();
        assert_eq!(json, r#"{"status":"success"}"#);
    }
}
