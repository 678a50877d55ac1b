//! Service layer: orchestration over ports and adapters.

pub mod conversation_service;
pub mod ingestion_service;
pub mod provisioner;
pub mod rag_service;

pub use conversation_service::ConversationService;
pub use ingestion_service::IngestionService;
pub use provisioner::StackProvisioner;
pub use rag_service::{RagService, RagSettings};
