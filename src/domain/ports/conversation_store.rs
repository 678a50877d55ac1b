use async_trait::async_trait;

use crate::domain::errors::ConversationError;
use crate::domain::models::{Message, StoredMessage};

/// Repository port for conversation persistence.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Append a message to a conversation.
    async fn put_message(
        &self,
        conversation_id: &str,
        message: &StoredMessage,
    ) -> Result<(), ConversationError>;

    /// Full history for a conversation, oldest first. Empty when the
    /// conversation has no messages.
    async fn history(&self, conversation_id: &str) -> Result<Vec<Message>, ConversationError>;

    /// Whether the conversation has at least one message.
    async fn has_messages(&self, conversation_id: &str) -> Result<bool, ConversationError>;
}
