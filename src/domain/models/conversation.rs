//! Conversation domain model.
//!
//! Conversations exist implicitly: one comes into being when its first
//! message is stored, and each message fades individually when its TTL
//! passes. The sort key is the write timestamp in microseconds, so history
//! reads back in chronological order.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

/// A message as handed to model APIs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}

/// A message as persisted in the conversations table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Write timestamp in epoch microseconds; doubles as the sort key.
    pub message_id: i64,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Epoch seconds at which the table expires this message.
    pub ttl: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl StoredMessage {
    /// Stamp a message for storage at `now`, expiring after `ttl`.
    pub fn stamped(
        role: MessageRole,
        content: String,
        metadata: Option<serde_json::Value>,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            message_id: now.timestamp_micros(),
            role,
            content,
            timestamp: now,
            ttl: (now + ttl).timestamp(),
            metadata,
        }
    }
}

/// Generate a fresh conversation id.
pub fn new_conversation_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("conv-{}", &hex[..12])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversation_id_format() {
        let id = new_conversation_id();
        assert!(id.starts_with("conv-"));
        assert_eq!(id.len(), "conv-".len() + 12);
        assert!(id["conv-".len()..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_conversation_ids_are_unique() {
        assert_ne!(new_conversation_id(), new_conversation_id());
    }

    #[test]
    fn test_stamped_message_ttl_and_sort_key() {
        let now = Utc::now();
        let message = StoredMessage::stamped(
            MessageRole::User,
            "hello".to_string(),
            None,
            now,
            Duration::days(1),
        );

        assert_eq!(message.message_id, now.timestamp_micros());
        assert_eq!(message.ttl, (now + Duration::days(1)).timestamp());
        assert_eq!(message.role, MessageRole::User);
    }

    #[test]
    fn test_role_round_trip() {
        for role in [MessageRole::User, MessageRole::Assistant, MessageRole::System] {
            assert_eq!(MessageRole::from_str(role.as_str()), Some(role));
        }
        assert_eq!(MessageRole::from_str("tool"), None);
    }
}
