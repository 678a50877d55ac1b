//! Ragstack - provisioning and query CLI for an agentic RAG stack on AWS.
//!
//! Ragstack declares and applies the cloud resource graph backing a
//! retrieval-augmented-generation application — an encrypted, versioned
//! documents bucket, a vector-search collection, a Bedrock knowledge base
//! with an S3 data source, least-privilege roles, two compute functions, a
//! conversations table, and the event wiring between them — and implements
//! the ingestion and retrieval/generation flows that run against it.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): resource synthesis, policy documents,
//!   conversation/RAG models, and port traits
//! - **Service Layer** (`services`): provisioning, ingestion, conversation,
//!   and retrieval-and-generation orchestration
//! - **Infrastructure Layer** (`infrastructure`): AWS adapters,
//!   configuration loading, logging, retry
//! - **CLI Layer** (`cli`): command-line interface

pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::models::{
    Config, LoggingConfig, RagRequest, RagResponse, RetryConfig, StackOutputs, StackSpec,
};
pub use domain::ports::{ConversationStore, KnowledgeBase, TextGenerator};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use infrastructure::retry::RetryPolicy;
pub use services::{ConversationService, IngestionService, RagService, StackProvisioner};
