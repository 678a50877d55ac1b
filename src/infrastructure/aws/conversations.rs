//! DynamoDB-backed conversation store.
//!
//! One item per message: partition key `conversation_id`, sort key
//! `message_id` (epoch microseconds), so a plain ascending query reads
//! history back in order. Each item carries its own TTL; expiry is never
//! refreshed on append, so idle conversations fade message by message.

use async_trait::async_trait;
use aws_sdk_dynamodb::error::ProvideErrorMetadata;
use aws_sdk_dynamodb::types::AttributeValue;
use tracing::{debug, warn};

use crate::domain::errors::ConversationError;
use crate::domain::models::{Message, MessageRole, StoredMessage};
use crate::domain::ports::ConversationStore;
use crate::infrastructure::retry::RetryPolicy;

fn store_error<E>(err: &E) -> ConversationError
where
    E: ProvideErrorMetadata + std::fmt::Debug,
{
    ConversationError::Api {
        code: err.code().unwrap_or("Unknown").to_string(),
        message: err
            .message()
            .map_or_else(|| format!("{err:?}"), ToString::to_string),
    }
}

/// Encode a JSON value as a DynamoDB attribute.
fn to_attribute_value(value: &serde_json::Value) -> AttributeValue {
    match value {
        serde_json::Value::Null => AttributeValue::Null(true),
        serde_json::Value::Bool(b) => AttributeValue::Bool(*b),
        serde_json::Value::Number(n) => AttributeValue::N(n.to_string()),
        serde_json::Value::String(s) => AttributeValue::S(s.clone()),
        serde_json::Value::Array(items) => {
            AttributeValue::L(items.iter().map(to_attribute_value).collect())
        }
        serde_json::Value::Object(map) => AttributeValue::M(
            map.iter()
                .map(|(k, v)| (k.clone(), to_attribute_value(v)))
                .collect(),
        ),
    }
}

pub struct DynamoConversationStore {
    client: aws_sdk_dynamodb::Client,
    table_name: String,
    retry: RetryPolicy,
}

impl DynamoConversationStore {
    pub fn new(env: &super::AwsEnv, table_name: String, retry: RetryPolicy) -> Self {
        Self {
            client: aws_sdk_dynamodb::Client::new(&env.sdk),
            table_name,
            retry,
        }
    }

    async fn query_messages(
        &self,
        conversation_id: &str,
        limit: Option<i32>,
    ) -> Result<Vec<std::collections::HashMap<String, AttributeValue>>, ConversationError> {
        let output = self
            .retry
            .execute(|| async {
                let mut request = self
                    .client
                    .query()
                    .table_name(&self.table_name)
                    .key_condition_expression("conversation_id = :conv_id")
                    .expression_attribute_values(
                        ":conv_id",
                        AttributeValue::S(conversation_id.to_string()),
                    )
                    .scan_index_forward(true);
                if let Some(limit) = limit {
                    request = request.limit(limit);
                }
                request.send().await.map_err(|e| {
                    store_error(&aws_sdk_dynamodb::Error::from(e))
                })
            })
            .await?;

        Ok(output.items().to_vec())
    }
}

#[async_trait]
impl ConversationStore for DynamoConversationStore {
    async fn put_message(
        &self,
        conversation_id: &str,
        message: &StoredMessage,
    ) -> Result<(), ConversationError> {
        self.retry
            .execute(|| async {
                let mut request = self
                    .client
                    .put_item()
                    .table_name(&self.table_name)
                    .item(
                        "conversation_id",
                        AttributeValue::S(conversation_id.to_string()),
                    )
                    .item("message_id", AttributeValue::N(message.message_id.to_string()))
                    .item("role", AttributeValue::S(message.role.as_str().to_string()))
                    .item("content", AttributeValue::S(message.content.clone()))
                    .item(
                        "timestamp",
                        AttributeValue::S(message.timestamp.to_rfc3339()),
                    )
                    .item("ttl", AttributeValue::N(message.ttl.to_string()));
                if let Some(metadata) = &message.metadata {
                    request = request.item("metadata", to_attribute_value(metadata));
                }
                request
                    .send()
                    .await
                    .map_err(|e| store_error(&aws_sdk_dynamodb::Error::from(e)))
            })
            .await?;

        debug!(
            conversation = %conversation_id,
            message_id = message.message_id,
            role = message.role.as_str(),
            "Stored message"
        );
        Ok(())
    }

    async fn history(&self, conversation_id: &str) -> Result<Vec<Message>, ConversationError> {
        let items = self.query_messages(conversation_id, None).await?;

        let mut messages = Vec::with_capacity(items.len());
        for item in items {
            let role = item
                .get("role")
                .and_then(|v| v.as_s().ok())
                .and_then(|s| MessageRole::from_str(s));
            let content = item.get("content").and_then(|v| v.as_s().ok());

            match (role, content) {
                (Some(role), Some(content)) => messages.push(Message {
                    role,
                    content: content.clone(),
                }),
                _ => {
                    warn!(conversation = %conversation_id, "Skipping malformed message item");
                }
            }
        }

        Ok(messages)
    }

    async fn has_messages(&self, conversation_id: &str) -> Result<bool, ConversationError> {
        let items = self.query_messages(conversation_id, Some(1)).await?;
        Ok(!items.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_attribute_value_scalars() {
        assert_eq!(
            to_attribute_value(&serde_json::json!("text")),
            AttributeValue::S("text".to_string())
        );
        assert_eq!(
            to_attribute_value(&serde_json::json!(42)),
            AttributeValue::N("42".to_string())
        );
        assert_eq!(
            to_attribute_value(&serde_json::json!(true)),
            AttributeValue::Bool(true)
        );
        assert_eq!(
            to_attribute_value(&serde_json::Value::Null),
            AttributeValue::Null(true)
        );
    }

    #[test]
    fn test_to_attribute_value_nested() {
        let value = serde_json::json!({
            "model_used": "anthropic.claude-3-haiku-20240307-v1:0",
            "sources": ["s3://bucket/documents/doc1.pdf"],
        });

        let attr = to_attribute_value(&value);
        let AttributeValue::M(map) = attr else {
            panic!("expected a map attribute");
        };
        assert_eq!(
            map["model_used"],
            AttributeValue::S("anthropic.claude-3-haiku-20240307-v1:0".to_string())
        );
        let AttributeValue::L(sources) = &map["sources"] else {
            panic!("expected a list attribute");
        };
        assert_eq!(
            sources[0],
            AttributeValue::S("s3://bucket/documents/doc1.pdf".to_string())
        );
    }
}
