//! Shared types for chorus-core

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};

use crate::error::RelayError;

/// The three providers a session talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    OpenAi,
    Claude,
    Gemini,
}

impl ProviderKind {
    /// Every provider, in fan-out and response order
    pub const ALL: [ProviderKind; 3] = [Self::OpenAi, Self::Claude, Self::Gemini];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Claude => "claude",
            Self::Gemini => "gemini",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "claude" => Ok(Self::Claude),
            "gemini" => Ok(Self::Gemini),
            _ => Err(RelayError::UnknownProvider(s.to_string())),
        }
    }
}

/// Outcome of one provider call: reply text or a failure cause
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderReply {
    Text(String),
    Error(String),
}

impl ProviderReply {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Text as returned to clients and stored in history; failures read `Error: <cause>`
    pub fn to_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Error(cause) => format!("Error: {}", cause),
        }
    }
}

impl std::fmt::Display for ProviderReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Error(cause) => write!(f, "Error: {}", cause),
        }
    }
}

impl Serialize for ProviderReply {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Merged result of a fan-out, one entry per provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FanOutReply {
    replies: BTreeMap<ProviderKind, ProviderReply>,
}

impl FanOutReply {
    pub(crate) fn insert(&mut self, provider: ProviderKind, reply: ProviderReply) {
        self.replies.insert(provider, reply);
    }

    pub fn get(&self, provider: ProviderKind) -> Option<&ProviderReply> {
        self.replies.get(&provider)
    }

    /// Replies in provider order
    pub fn iter(&self) -> impl Iterator<Item = (ProviderKind, &ProviderReply)> {
        self.replies.iter().map(|(k, v)| (*k, v))
    }

    pub fn len(&self) -> usize {
        self.replies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replies.is_empty()
    }

    /// Number of providers that failed
    pub fn error_count(&self) -> usize {
        self.replies.values().filter(|r| r.is_error()).count()
    }
}

/// Reply from a single-provider continuation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SingleReply {
    pub response: ProviderReply,
    pub model: ProviderKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_round_trip() {
        for kind in ProviderKind::ALL {
            assert_eq!(kind.to_string().parse::<ProviderKind>().unwrap(), kind);
        }
        assert_eq!(" Claude ".parse::<ProviderKind>().unwrap(), ProviderKind::Claude);
    }

    #[test]
    fn test_provider_kind_unknown() {
        let err = "mistral".parse::<ProviderKind>().unwrap_err();
        assert!(matches!(err, RelayError::UnknownProvider(name) if name == "mistral"));
    }

    #[test]
    fn test_reply_text_forms() {
        assert_eq!(ProviderReply::Text("hi".into()).to_text(), "hi");
        let err = ProviderReply::Error("status 401".into());
        assert!(err.is_error());
        assert_eq!(err.to_text(), "Error: status 401");
    }

    #[test]
    fn test_fan_out_reply_serializes_as_flat_map() {
        let mut reply = FanOutReply::default();
        reply.insert(ProviderKind::Gemini, ProviderReply::Text("g".into()));
        reply.insert(ProviderKind::OpenAi, ProviderReply::Text("o".into()));
        reply.insert(ProviderKind::Claude, ProviderReply::Error("down".into()));

        let json = serde_json::to_string(&reply).unwrap();
        assert_eq!(json, r#"{"openai":"o","claude":"Error: down","gemini":"g"}"#);
        assert_eq!(reply.error_count(), 1);
        let order: Vec<ProviderKind> = reply.iter().map(|(k, _)| k).collect();
        assert_eq!(order, ProviderKind::ALL.to_vec());
    }

    #[test]
    fn test_single_reply_shape() {
        let reply = SingleReply {
            response: ProviderReply::Text("sure".into()),
            model: ProviderKind::Claude,
        };
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json, serde_json::json!({"response": "sure", "model": "claude"}));
    }
}
