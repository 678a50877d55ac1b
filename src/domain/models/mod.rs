//! Domain models.

pub mod config;
pub mod conversation;
pub mod policy;
pub mod rag;
pub mod stack;

pub use config::{
    AwsSettings, BucketSettings, Config, ConversationSettings, FunctionEntry, FunctionSettings,
    HttpApiSettings, KnowledgeBaseSettings, LoggingConfig, ModelSettings, RetrievalSettings,
    RetryConfig, StackSettings,
};
pub use conversation::{new_conversation_id, Message, MessageRole, StoredMessage};
pub use policy::{Effect, PolicyDocument, PolicyStatement, RoleSpec, TrustPolicy};
pub use rag::{
    GenerationRequest, IngestionJob, RagRequest, RagResponse, Retrieval, RetrievedChunk, SourceRef,
};
pub use stack::{
    model_arn, notification_rules, BucketSpec, CollectionSpec, FunctionSpec, HttpApiSpec,
    KnowledgeBaseSpec, NotificationRule, StackOutputs, StackSpec, TableSpec, VectorIndexSpec,
};
