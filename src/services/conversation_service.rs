//! Conversation context and history management.
//!
//! Conversations are created implicitly: this service only hands out ids
//! and appends TTL-stamped messages; the first append brings the
//! conversation into existence.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::debug;

use crate::domain::errors::ConversationError;
use crate::domain::models::{new_conversation_id, Message, MessageRole, StoredMessage};
use crate::domain::ports::ConversationStore;

pub struct ConversationService {
    store: Arc<dyn ConversationStore>,
    message_ttl: Duration,
}

impl ConversationService {
    pub fn new(store: Arc<dyn ConversationStore>, message_ttl_secs: i64) -> Self {
        Self {
            store,
            message_ttl: Duration::seconds(message_ttl_secs),
        }
    }

    /// Resolve a usable conversation id: keep an id that names an existing
    /// conversation, otherwise generate a fresh one.
    pub async fn ensure_conversation(
        &self,
        conversation_id: Option<&str>,
    ) -> Result<String, ConversationError> {
        if let Some(id) = conversation_id {
            if self.store.has_messages(id).await? {
                return Ok(id.to_string());
            }
        }

        let id = new_conversation_id();
        debug!(conversation = %id, "Generated new conversation id");
        Ok(id)
    }

    /// Resolve the conversation id and load its history in one step. A new
    /// conversation yields an empty history.
    pub async fn get_or_create_history(
        &self,
        conversation_id: Option<&str>,
    ) -> Result<(String, Vec<Message>), ConversationError> {
        let id = self.ensure_conversation(conversation_id).await?;
        let history = self.store.history(&id).await?;
        Ok((id, history))
    }

    /// Append a message, stamping the sort key and TTL at write time.
    pub async fn add_message(
        &self,
        conversation_id: &str,
        role: MessageRole,
        content: String,
        metadata: Option<serde_json::Value>,
    ) -> Result<(), ConversationError> {
        let message = StoredMessage::stamped(role, content, metadata, Utc::now(), self.message_ttl);
        self.store.put_message(conversation_id, &message).await
    }
}
